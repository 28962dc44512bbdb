//! Model-ready feature rows.
//!
//! Feature names follow the `{series}_lag{k}` / `{series}_mm{w}` convention
//! used in model metadata, so a model's `feature_order` can be resolved
//! against any row with [`FeatureRow::get`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Name of the target series.
pub const TARGET: &str = "cases";

/// Exogenous series, in storage order.
pub const EXOGENOUS: [&str; 3] = ["temp", "prec", "umid"];

/// Target lag offsets, in weeks.
pub const TARGET_LAGS: [usize; 12] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

/// Exogenous lag offsets, in weeks.
pub const EXOGENOUS_LAGS: [usize; 4] = [1, 2, 4, 8];

/// Trailing rolling-mean window sizes, in weeks.
pub const ROLLING_WINDOWS: [usize; 3] = [2, 4, 8];

/// Period of the seasonal encoding, in weeks.
pub const SEASON_WEEKS: f64 = 52.0;

/// Current value, lags and rolling means of one exogenous series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesFeatures {
  pub value: Option<f64>,
  /// Aligned with [`EXOGENOUS_LAGS`].
  pub lags:  [Option<f64>; 4],
  /// Aligned with [`ROLLING_WINDOWS`].
  pub means: [Option<f64>; 3],
}

/// One derived row of the `features_weekly` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
  pub locality:     String,
  pub date:         NaiveDate,
  pub target:       f64,
  /// Aligned with [`TARGET_LAGS`]; `None` until enough weeks are observed.
  pub target_lags:  [Option<f64>; 12],
  /// Aligned with [`ROLLING_WINDOWS`].
  pub target_means: [Option<f64>; 3],
  pub temp:         SeriesFeatures,
  pub prec:         SeriesFeatures,
  pub umid:         SeriesFeatures,
  pub seasonal_sin: f64,
  pub seasonal_cos: f64,
  pub month:        u32,
}

impl FeatureRow {
  /// `true` once every target lag is observed. Rows that fail this check are
  /// kept in the table but must not enter a training or inference window.
  pub fn has_full_history(&self) -> bool {
    self.target_lags.iter().all(Option::is_some)
  }

  pub fn series(&self, name: &str) -> Option<&SeriesFeatures> {
    match name {
      "temp" => Some(&self.temp),
      "prec" => Some(&self.prec),
      "umid" => Some(&self.umid),
      _ => None,
    }
  }

  fn series_mut(&mut self, name: &str) -> Option<&mut SeriesFeatures> {
    match name {
      "temp" => Some(&mut self.temp),
      "prec" => Some(&mut self.prec),
      "umid" => Some(&mut self.umid),
      _ => None,
    }
  }

  /// Look up a feature by name. Unknown names and unobserved values are
  /// both `None`.
  pub fn get(&self, name: &str) -> Option<f64> {
    match name {
      TARGET | "target" => return Some(self.target),
      "seasonal_sin" | "s_sin" => return Some(self.seasonal_sin),
      "seasonal_cos" | "s_cos" => return Some(self.seasonal_cos),
      "month" => return Some(f64::from(self.month)),
      _ => {}
    }

    let (series, suffix) = match name.split_once('_') {
      Some(parts) => parts,
      None => return self.series(name)?.value,
    };

    if let Some(k) = suffix.strip_prefix("lag").and_then(|k| k.parse().ok()) {
      return if series == TARGET {
        slot(&TARGET_LAGS, k).and_then(|i| self.target_lags[i])
      } else {
        let s = self.series(series)?;
        slot(&EXOGENOUS_LAGS, k).and_then(|i| s.lags[i])
      };
    }

    if let Some(w) = suffix.strip_prefix("mm").and_then(|w| w.parse().ok()) {
      let i = slot(&ROLLING_WINDOWS, w)?;
      return if series == TARGET {
        self.target_means[i]
      } else {
        self.series(series)?.means[i]
      };
    }

    None
  }

  /// The values of `order`, or `None` if any of them is unobserved.
  pub fn vector(&self, order: &[String]) -> Option<Vec<f64>> {
    order.iter().map(|name| self.get(name)).collect()
  }

  /// Values aligned with [`stored_columns`].
  pub fn stored_values(&self) -> Vec<Option<f64>> {
    stored_columns().iter().map(|c| self.get(c)).collect()
  }

  /// Rebuild a row from values aligned with [`stored_columns`].
  pub fn from_stored(
    locality: String,
    date: NaiveDate,
    target: f64,
    values: &[Option<f64>],
  ) -> Self {
    let mut row = Self {
      locality,
      date,
      target,
      target_lags: [None; 12],
      target_means: [None; 3],
      temp: SeriesFeatures::default(),
      prec: SeriesFeatures::default(),
      umid: SeriesFeatures::default(),
      seasonal_sin: 0.0,
      seasonal_cos: 0.0,
      month: 0,
    };
    for (name, value) in stored_columns().iter().zip(values) {
      row.set(name, *value);
    }
    row
  }

  fn set(&mut self, name: &str, value: Option<f64>) {
    match name {
      "seasonal_sin" => self.seasonal_sin = value.unwrap_or_default(),
      "seasonal_cos" => self.seasonal_cos = value.unwrap_or_default(),
      "month" => self.month = value.unwrap_or_default() as u32,
      _ => {
        let Some((series, suffix)) = name.split_once('_') else {
          if let Some(s) = self.series_mut(name) {
            s.value = value;
          }
          return;
        };
        let lag = suffix.strip_prefix("lag").and_then(|k| k.parse::<usize>().ok());
        let window = suffix.strip_prefix("mm").and_then(|w| w.parse::<usize>().ok());
        match (series == TARGET, lag, window) {
          (true, Some(k), _) => {
            if let Some(i) = slot(&TARGET_LAGS, k) {
              self.target_lags[i] = value;
            }
          }
          (true, None, Some(w)) => {
            if let Some(i) = slot(&ROLLING_WINDOWS, w) {
              self.target_means[i] = value;
            }
          }
          (false, Some(k), _) => {
            if let (Some(i), Some(s)) = (slot(&EXOGENOUS_LAGS, k), self.series_mut(series)) {
              s.lags[i] = value;
            }
          }
          (false, None, Some(w)) => {
            if let (Some(i), Some(s)) = (slot(&ROLLING_WINDOWS, w), self.series_mut(series)) {
              s.means[i] = value;
            }
          }
          _ => {}
        }
      }
    }
  }
}

fn slot(offsets: &[usize], k: usize) -> Option<usize> {
  offsets.iter().position(|&o| o == k)
}

/// Every feature column persisted next to `target`, in table order.
pub fn stored_columns() -> Vec<String> {
  let mut cols = Vec::new();
  cols.extend(TARGET_LAGS.iter().map(|k| format!("{TARGET}_lag{k}")));
  cols.extend(ROLLING_WINDOWS.iter().map(|w| format!("{TARGET}_mm{w}")));
  for series in EXOGENOUS {
    cols.push(series.to_string());
    cols.extend(EXOGENOUS_LAGS.iter().map(|k| format!("{series}_lag{k}")));
    cols.extend(ROLLING_WINDOWS.iter().map(|w| format!("{series}_mm{w}")));
  }
  cols.extend(["seasonal_sin", "seasonal_cos", "month"].map(String::from));
  cols
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> FeatureRow {
    let mut values = vec![None; stored_columns().len()];
    for (i, name) in stored_columns().iter().enumerate() {
      values[i] = Some(i as f64);
      if name == "month" {
        values[i] = Some(7.0);
      }
    }
    FeatureRow::from_stored(
      "Diamantina".into(),
      NaiveDate::from_ymd_opt(2024, 7, 7).unwrap(),
      42.0,
      &values,
    )
  }

  #[test]
  fn stored_values_roundtrip_through_names() {
    let row = sample();
    let again = FeatureRow::from_stored(
      row.locality.clone(),
      row.date,
      row.target,
      &row.stored_values(),
    );
    assert_eq!(row, again);
  }

  #[test]
  fn get_resolves_every_stored_column() {
    let row = sample();
    for name in stored_columns() {
      assert!(row.get(&name).is_some(), "{name} did not resolve");
    }
    assert_eq!(row.get("cases"), Some(42.0));
    assert_eq!(row.get("month"), Some(7.0));
    assert_eq!(row.get("s_sin"), row.get("seasonal_sin"));
  }

  #[test]
  fn unknown_or_unsupported_offsets_are_none() {
    let row = sample();
    assert_eq!(row.get("cases_lag13"), None);
    assert_eq!(row.get("temp_lag3"), None);
    assert_eq!(row.get("wind"), None);
  }

  #[test]
  fn vector_requires_every_feature() {
    let mut row = sample();
    let order = vec!["cases".to_string(), "temp_lag1".to_string()];
    assert_eq!(row.vector(&order).map(|v| v.len()), Some(2));
    row.temp.lags[0] = None;
    assert_eq!(row.vector(&order), None);
  }

  #[test]
  fn full_history_tracks_target_lags() {
    let mut row = sample();
    assert!(row.has_full_history());
    row.target_lags[11] = None;
    assert!(!row.has_full_history());
  }
}
