//! Error types for source normalising and ingestion runs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The source has no recognisable date column or no value column. The
  /// ingestion run skips such a source and carries on with the others.
  #[error("schema mismatch in {origin}: {reason}")]
  SchemaMismatch { origin: String, reason: String },

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Core(#[from] arbo_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn mismatch(origin: &str, reason: impl Into<String>) -> Self {
    Self::SchemaMismatch { origin: origin.to_string(), reason: reason.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
