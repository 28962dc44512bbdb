//! Monte Carlo Dropout rollouts and their reduction to bands.
//!
//! Each sample drives the model autoregressively for `horizon` steps with its
//! own seeded RNG, so every sample draws its own dropout masks. Samples run in
//! parallel on the rayon pool.

use ndarray::{Array2, ArrayView2, Axis, concatenate, s};
use rand::{RngCore, SeedableRng, rngs::StdRng};
use rayon::prelude::*;

use crate::{Result, model::SequenceModel, scaler::Scaler};

/// How a scaled prediction is written back into the window's target slot.
pub struct Feedback<'a> {
  pub target_index: usize,
  /// Input scaler (all feature columns).
  pub x:            &'a Scaler,
  /// Target scaler (one column); the model predicts in this space.
  pub y:            &'a Scaler,
}

impl Feedback<'_> {
  fn to_input_space(&self, prediction: f64) -> f64 {
    let original = self.y.inverse_value(0, prediction);
    self.x.transform_value(self.target_index, original)
  }
}

/// Roll one sample forward.
///
/// Each step copies the last window row, overwrites only the target slot and
/// slides the window; exogenous columns carry their last value forward.
pub fn rollout(
  model: &dyn SequenceModel,
  window: ArrayView2<'_, f64>,
  feedback: &Feedback<'_>,
  horizon: usize,
  rng: Option<&mut StdRng>,
) -> Result<Vec<f64>> {
  let mut window = window.to_owned();
  let mut rng = rng;
  let mut predictions = Vec::with_capacity(horizon);

  for _ in 0..horizon {
    let y = match rng.as_deref_mut() {
      Some(r) => model.forward(window.view(), Some(r as &mut dyn RngCore))?,
      None => model.forward(window.view(), None)?,
    };
    predictions.push(y);

    let last = window.nrows() - 1;
    let mut next = window.slice(s![last..=last, ..]).to_owned();
    next[[0, feedback.target_index]] = feedback.to_input_space(y);
    window = concatenate(Axis(0), &[window.slice(s![1.., ..]), next.view()])
      .map_err(|e| crate::Error::InvalidArtifact(e.to_string()))?;
  }
  Ok(predictions)
}

/// `samples × horizon` matrix of scaled predictions.
pub fn monte_carlo(
  model: &dyn SequenceModel,
  window: ArrayView2<'_, f64>,
  feedback: &Feedback<'_>,
  horizon: usize,
  samples: usize,
  seed: u64,
) -> Result<Array2<f64>> {
  let rows: Vec<Vec<f64>> = (0..samples)
    .into_par_iter()
    .map(|i| {
      let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
      rollout(model, window, feedback, horizon, Some(&mut rng))
    })
    .collect::<Result<_>>()?;

  let flat: Vec<f64> = rows.into_iter().flatten().collect();
  Array2::from_shape_vec((samples, horizon), flat)
    .map_err(|e| crate::Error::InvalidArtifact(e.to_string()))
}

/// Per-step mean and quantile bands.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
  pub mean:  Vec<f64>,
  pub lower: Vec<f64>,
  pub upper: Vec<f64>,
}

/// Linear-interpolated quantile of `values`.
pub fn quantile(values: &[f64], q: f64) -> f64 {
  if values.is_empty() {
    return f64::NAN;
  }
  let mut sorted = values.to_vec();
  sorted.sort_by(f64::total_cmp);
  let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  let frac = pos - lo as f64;
  sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Reduce each column of `samples`. The band always contains the mean.
pub fn reduce(samples: ArrayView2<'_, f64>, lower_q: f64, upper_q: f64) -> Band {
  let mut band = Band { mean: Vec::new(), lower: Vec::new(), upper: Vec::new() };
  for column in samples.axis_iter(Axis(1)) {
    let values = column.to_vec();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    band.mean.push(mean);
    band.lower.push(quantile(&values, lower_q).min(mean));
    band.upper.push(quantile(&values, upper_q).max(mean));
  }
  band
}
