//! Column-wise feature scalers.
//!
//! One tagged enum covers both persisted scaler styles, so callers never check
//! for capabilities: [`Scaler::transform`] maps a `(rows, columns)` matrix into
//! model space and [`Scaler::inverse`] maps a single column back.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Ranges and deviations below this are treated as constant columns.
const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
  /// `(x - min) / (max - min)`.
  MinMax { min: Vec<f64>, max: Vec<f64> },
  /// `(x - mean) / std`.
  Standard { mean: Vec<f64>, std: Vec<f64> },
}

impl Scaler {
  /// Fit a min/max scaler on every column of `data`.
  pub fn fit_min_max(data: ArrayView2<'_, f64>) -> Result<Self> {
    if data.nrows() == 0 {
      return Err(Error::InsufficientHistory {
        locality:  "scaler fit".into(),
        required:  1,
        available: 0,
      });
    }
    ensure_finite(data.iter().copied(), "scaler fit input")?;
    let min = data
      .axis_iter(Axis(1))
      .map(|col| col.iter().copied().fold(f64::INFINITY, f64::min))
      .collect();
    let max = data
      .axis_iter(Axis(1))
      .map(|col| col.iter().copied().fold(f64::NEG_INFINITY, f64::max))
      .collect();
    Ok(Scaler::MinMax { min, max })
  }

  /// Use `loaded` when present, otherwise fit a min/max scaler on `history`.
  /// The flag tells whether the result was fitted.
  pub fn fit_or_load(loaded: Option<&Scaler>, history: ArrayView2<'_, f64>) -> Result<(Self, bool)> {
    match loaded {
      Some(s) => Ok((s.clone(), false)),
      None => Ok((Self::fit_min_max(history)?, true)),
    }
  }

  /// Number of columns this scaler covers.
  pub fn width(&self) -> usize {
    match self {
      Scaler::MinMax { min, .. } => min.len(),
      Scaler::Standard { mean, .. } => mean.len(),
    }
  }

  /// Check internal consistency: equal-length, finite parameters.
  pub fn validate(&self) -> Result<()> {
    let (a, b) = match self {
      Scaler::MinMax { min, max } => (min, max),
      Scaler::Standard { mean, std } => (mean, std),
    };
    if a.len() != b.len() {
      return Err(Error::ShapeMismatch { expected: a.len(), actual: b.len() });
    }
    ensure_finite(a.iter().chain(b).copied(), "scaler parameters")
  }

  /// `(offset, scale)` for `col`; constant columns get scale 1.
  fn params(&self, col: usize) -> (f64, f64) {
    let (offset, spread) = match self {
      Scaler::MinMax { min, max } => (min[col], max[col] - min[col]),
      Scaler::Standard { mean, std } => (mean[col], std[col]),
    };
    let scale = if spread.abs() < EPSILON { 1.0 } else { spread };
    (offset, scale)
  }

  /// A one-column scaler for column `col`.
  pub fn column(&self, col: usize) -> Result<Self> {
    if col >= self.width() {
      return Err(Error::ShapeMismatch { expected: self.width(), actual: col + 1 });
    }
    Ok(match self {
      Scaler::MinMax { min, max } => Scaler::MinMax { min: vec![min[col]], max: vec![max[col]] },
      Scaler::Standard { mean, std } => {
        Scaler::Standard { mean: vec![mean[col]], std: vec![std[col]] }
      }
    })
  }

  pub fn transform_value(&self, col: usize, x: f64) -> f64 {
    let (offset, scale) = self.params(col);
    (x - offset) / scale
  }

  pub fn inverse_value(&self, col: usize, x: f64) -> f64 {
    let (offset, scale) = self.params(col);
    x * scale + offset
  }

  /// Scale every column of `data`.
  pub fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
    if data.ncols() != self.width() {
      return Err(Error::ShapeMismatch { expected: self.width(), actual: data.ncols() });
    }
    ensure_finite(data.iter().copied(), "scaler input")?;
    let mut out = data.to_owned();
    for (col, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
      let (offset, scale) = self.params(col);
      column.mapv_inplace(|x| (x - offset) / scale);
    }
    Ok(out)
  }

  /// Map values of the first column back to original units.
  pub fn inverse(&self, values: &[f64]) -> Result<Vec<f64>> {
    if self.width() == 0 {
      return Err(Error::ShapeMismatch { expected: 1, actual: 0 });
    }
    let out: Vec<f64> = values.iter().map(|&v| self.inverse_value(0, v)).collect();
    ensure_finite(out.iter().copied(), "inverse-scaled output")?;
    Ok(out)
  }
}

/// Fail with [`Error::NumericInstability`] on the first NaN or infinity.
pub(crate) fn ensure_finite(values: impl IntoIterator<Item = f64>, what: &str) -> Result<()> {
  if values.into_iter().all(f64::is_finite) {
    Ok(())
  } else {
    Err(Error::NumericInstability(what.to_string()))
  }
}
