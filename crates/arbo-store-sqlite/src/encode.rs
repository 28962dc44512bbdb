//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Week dates are stored as `%Y-%m-%d`, timestamps as RFC 3339 UTC strings and
//! the per-week forecast series as compact JSON arrays.

use arbo_core::{
  feature::FeatureRow,
  forecast::{Confidence, ForecastRun, ScalingSource},
  weekly::{WeeklyCaseRow, WeeklyWeatherRow},
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value;

use crate::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width so that text order matches time order.
pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── ScalingSource / Confidence ──────────────────────────────────────────────

pub fn encode_scaling(s: ScalingSource) -> &'static str {
  match s {
    ScalingSource::Loaded => "loaded",
    ScalingSource::FittedOnHistory => "fitted_on_history",
    ScalingSource::None => "none",
  }
}

pub fn decode_scaling(s: &str) -> Result<ScalingSource> {
  match s {
    "loaded" => Ok(ScalingSource::Loaded),
    "fitted_on_history" => Ok(ScalingSource::FittedOnHistory),
    "none" => Ok(ScalingSource::None),
    other => Err(Error::UnknownVariant { kind: "scaling", value: other.to_string() }),
  }
}

pub fn encode_confidence(c: Confidence) -> &'static str {
  match c {
    Confidence::Model => "model",
    Confidence::Low => "low",
  }
}

pub fn decode_confidence(s: &str) -> Result<Confidence> {
  match s {
    "model" => Ok(Confidence::Model),
    "low" => Ok(Confidence::Low),
    other => Err(Error::UnknownVariant { kind: "confidence", value: other.to_string() }),
  }
}

// ─── Weekly rows ─────────────────────────────────────────────────────────────

/// A `weekly_cases` row as read from SQLite before date decoding.
pub struct RawCaseRow {
  pub locality:    String,
  pub date:        String,
  pub cases:       i64,
  pub total_cases: Option<i64>,
}

impl RawCaseRow {
  pub fn into_row(self) -> Result<WeeklyCaseRow> {
    Ok(WeeklyCaseRow {
      locality:    self.locality,
      date:        decode_date(&self.date)?,
      cases:       self.cases,
      total_cases: self.total_cases,
    })
  }
}

/// A `weather_weekly` row as read from SQLite before date decoding.
pub struct RawWeatherRow {
  pub locality: String,
  pub date:     String,
  pub temp:     Option<f64>,
  pub prec:     Option<f64>,
  pub umid:     Option<f64>,
}

impl RawWeatherRow {
  pub fn into_row(self) -> Result<WeeklyWeatherRow> {
    Ok(WeeklyWeatherRow {
      locality: self.locality,
      date:     decode_date(&self.date)?,
      temp:     self.temp,
      prec:     self.prec,
      umid:     self.umid,
    })
  }
}

// ─── Features ────────────────────────────────────────────────────────────────

/// Bind values for one `features_weekly` insert, in column order.
pub fn encode_feature_row(row: &FeatureRow) -> Vec<Value> {
  let mut values = Vec::with_capacity(3 + arbo_core::feature::stored_columns().len());
  values.push(Value::Text(row.locality.clone()));
  values.push(Value::Text(encode_date(row.date)));
  values.push(Value::Real(row.target));
  values.extend(row.stored_values().into_iter().map(|v| match v {
    Some(x) => Value::Real(x),
    None => Value::Null,
  }));
  values
}

/// A `features_weekly` row as read from SQLite.
pub struct RawFeatureRow {
  pub locality: String,
  pub date:     String,
  pub target:   f64,
  pub values:   Vec<Option<f64>>,
}

impl RawFeatureRow {
  pub fn into_row(self) -> Result<FeatureRow> {
    let date = decode_date(&self.date)?;
    Ok(FeatureRow::from_stored(self.locality, date, self.target, &self.values))
  }
}

// ─── Forecasts ───────────────────────────────────────────────────────────────

/// A `forecasts` row with every column still in its stored text form.
pub struct RawForecastRun {
  pub locality:   String,
  pub run_at:     String,
  pub model_name: String,
  pub horizon:    i64,
  pub start_date: String,
  pub yhat:       String,
  pub lower:      String,
  pub upper:      String,
  pub scaling:    String,
  pub confidence: String,
  pub metadata:   String,
}

impl RawForecastRun {
  pub fn encode(run: &ForecastRun) -> Result<Self> {
    Ok(Self {
      locality:   run.locality.clone(),
      run_at:     encode_dt(run.run_at),
      model_name: run.model_name.clone(),
      horizon:    run.horizon as i64,
      start_date: encode_date(run.start_date),
      yhat:       serde_json::to_string(&run.yhat)?,
      lower:      serde_json::to_string(&run.lower)?,
      upper:      serde_json::to_string(&run.upper)?,
      scaling:    encode_scaling(run.scaling).to_string(),
      confidence: encode_confidence(run.confidence).to_string(),
      metadata:   serde_json::to_string(&run.metadata)?,
    })
  }

  pub fn into_run(self) -> Result<ForecastRun> {
    Ok(ForecastRun {
      locality:   self.locality,
      run_at:     decode_dt(&self.run_at)?,
      model_name: self.model_name,
      horizon:    self.horizon as usize,
      start_date: decode_date(&self.start_date)?,
      yhat:       serde_json::from_str(&self.yhat)?,
      lower:      serde_json::from_str(&self.lower)?,
      upper:      serde_json::from_str(&self.upper)?,
      scaling:    decode_scaling(&self.scaling)?,
      confidence: decode_confidence(&self.confidence)?,
      metadata:   serde_json::from_str(&self.metadata)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn date_is_iso() {
    let d = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
    assert_eq!(encode_date(d), "2024-01-07");
    assert_eq!(decode_date("2024-01-07").unwrap(), d);
    assert!(decode_date("07/01/2024").is_err());
  }

  #[test]
  fn unknown_variants_are_rejected() {
    assert!(matches!(decode_scaling("zscore"), Err(Error::UnknownVariant { .. })));
    assert!(matches!(decode_confidence("high"), Err(Error::UnknownVariant { .. })));
  }
}
