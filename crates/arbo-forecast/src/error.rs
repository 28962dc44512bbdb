//! Error types for feature building and forecasting.
//!
//! `ModelUnavailable` and `ScalerMissing` are expected degradations that the
//! engine recovers from (naive tier, fitted scaler). Every other variant is a
//! genuine failure and propagates to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{locality}: need {required} usable weekly rows, found {available}")]
  InsufficientHistory {
    locality:  String,
    required:  usize,
    available: usize,
  },

  #[error("no trained model available: {0}")]
  ModelUnavailable(String),

  #[error("no persisted {0} scaler")]
  ScalerMissing(&'static str),

  #[error("non-finite value in {0}")]
  NumericInstability(String),

  #[error("forecast horizon must be at least 1")]
  InvalidHorizon,

  #[error("invalid model artifact: {0}")]
  InvalidArtifact(String),

  #[error("shape mismatch: expected {expected}, got {actual}")]
  ShapeMismatch { expected: usize, actual: usize },

  #[error(transparent)]
  Core(#[from] arbo_core::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("background task failed: {0}")]
  Join(#[from] tokio::task::JoinError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub(crate) fn store_error<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Store(Box::new(e))
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
