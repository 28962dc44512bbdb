//! Error types for `arbo-core`.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Strict resolution found no stored locality with a matching slug.
  #[error("locality not found: {0:?}")]
  LocalityNotFound(String),

  #[error("{date} does not fall on the {anchor} week anchor")]
  UnanchoredDate { date: NaiveDate, anchor: String },

  #[error("unknown weekday: {0:?}")]
  UnknownWeekday(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
