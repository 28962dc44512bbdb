//! Weekly rows: the persisted, aggregated shape of every ingestion source.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One week of case counts for a locality. Unique on `(locality, date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCaseRow {
  pub locality:    String,
  /// Week anchor date.
  pub date:        NaiveDate,
  /// Authoritative weekly count; always replaced by the latest batch.
  pub cases:       i64,
  /// Legacy mirror of `cases`. Kept from the stored row when `None`.
  pub total_cases: Option<i64>,
}

impl WeeklyCaseRow {
  /// A row whose mirror field copies `cases`.
  pub fn new(locality: impl Into<String>, date: NaiveDate, cases: i64) -> Self {
    Self {
      locality: locality.into(),
      date,
      cases,
      total_cases: Some(cases),
    }
  }
}

/// One week of weather for a locality. Unique on `(locality, date)`.
///
/// Every measurement is independently nullable, and a null never erases a
/// stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyWeatherRow {
  pub locality: String,
  pub date:     NaiveDate,
  /// Mean air temperature, °C.
  pub temp:     Option<f64>,
  /// Total precipitation, mm.
  pub prec:     Option<f64>,
  /// Mean relative humidity, %.
  pub umid:     Option<f64>,
}

impl WeeklyWeatherRow {
  pub fn empty(locality: impl Into<String>, date: NaiveDate) -> Self {
    Self {
      locality: locality.into(),
      date,
      temp: None,
      prec: None,
      umid: None,
    }
  }
}
