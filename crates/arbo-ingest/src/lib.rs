//! Source normalising and weekly aggregation for Arbo.
//!
//! Raw case and weather tables arrive with whatever column names, delimiters,
//! date conventions and encodings their producer chose. This crate maps them
//! to canonical rows, folds them onto the weekly axis and merges the result
//! into a [`WeeklyStore`](arbo_core::store::WeeklyStore).
//!
//! # Quick start
//!
//! ```no_run
//! # async fn run(store: &impl arbo_core::store::WeeklyStore) -> arbo_ingest::Result<()> {
//! use arbo_ingest::{IngestOptions, Source, SourceKind, ingest};
//!
//! let sources = vec![Source::from_path("data/teofilo_otoni.csv", SourceKind::Weather)?];
//! let report = ingest(store, &sources, IngestOptions::default()).await?;
//! println!("{} weather weeks", report.weather_rows);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod columns;
pub mod error;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod table;

pub use error::{Error, Result};
pub use normalize::{Normalized, Source, SourceKind, discover, normalize};
pub use pipeline::{IngestOptions, IngestReport, SkippedSource, ingest, write_weekly};
pub use table::RawTable;
