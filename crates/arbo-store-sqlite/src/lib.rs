//! SQLite backend for the weekly tables.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. That thread executes calls one at a
//! time, so two batches for the same locality can never interleave; each
//! batch additionally runs inside its own transaction.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
