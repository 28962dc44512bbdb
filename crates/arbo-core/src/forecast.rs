//! Forecast run records: the append-only audit trail of produced forecasts.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where the scaling used by a forecast came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingSource {
  /// Scalers persisted next to the model artifact.
  Loaded,
  /// Min/max scaler fit on the locality's own history.
  FittedOnHistory,
  /// No scaling involved (naive forecasts).
  None,
}

/// How much a forecast should be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
  /// Produced by the trained sequence model.
  Model,
  /// Produced by the naive fallback tier.
  Low,
}

/// One stored forecast. Keyed by `(locality, run_at, model_name)` and never
/// updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRun {
  pub locality:   String,
  pub run_at:     DateTime<Utc>,
  pub model_name: String,
  pub horizon:    usize,
  /// First forecast week.
  pub start_date: NaiveDate,
  pub yhat:       Vec<f64>,
  pub lower:      Vec<f64>,
  pub upper:      Vec<f64>,
  pub scaling:    ScalingSource,
  pub confidence: Confidence,
  /// Free-form provenance (lookback, feature order, sample count).
  pub metadata:   serde_json::Value,
}
