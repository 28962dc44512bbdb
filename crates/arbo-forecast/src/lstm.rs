//! A stacked LSTM with a dense head, evaluated on `ndarray`.
//!
//! Weights come from `model.json`. Gate blocks are ordered input, forget,
//! cell, output. Dropout is applied to every layer input (and to the
//! recurrent state) with one mask per forward pass, shared across timesteps,
//! and inverted scaling `1 / (1 - p)`.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, model::SequenceModel, scaler::ensure_finite};

// ─── Artifact ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
  #[default]
  Linear,
  Relu,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayerSpec {
  /// `4H × in`.
  pub w_input:     Vec<Vec<f64>>,
  /// `4H × H`.
  pub w_recurrent: Vec<Vec<f64>>,
  /// `4H`.
  pub bias:        Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayerSpec {
  /// `out × in`.
  pub weights:    Vec<Vec<f64>>,
  pub bias:       Vec<f64>,
  #[serde(default)]
  pub activation: Activation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmArtifact {
  pub lstm:    Vec<LstmLayerSpec>,
  pub dense:   Vec<DenseLayerSpec>,
  #[serde(default)]
  pub dropout: f64,
}

fn matrix(rows: &[Vec<f64>], what: &str) -> Result<Array2<f64>> {
  let ncols = rows.first().map_or(0, Vec::len);
  if rows.iter().any(|r| r.len() != ncols) {
    return Err(Error::InvalidArtifact(format!("{what} has ragged rows")));
  }
  let flat: Vec<f64> = rows.iter().flatten().copied().collect();
  ensure_finite(flat.iter().copied(), what)?;
  Array2::from_shape_vec((rows.len(), ncols), flat)
    .map_err(|e| Error::InvalidArtifact(format!("{what}: {e}")))
}

fn check(expected: usize, actual: usize) -> Result<()> {
  if expected == actual { Ok(()) } else { Err(Error::ShapeMismatch { expected, actual }) }
}

// ─── Runtime ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct LstmLayer {
  w_input:     Array2<f64>,
  w_recurrent: Array2<f64>,
  bias:        Array1<f64>,
  hidden:      usize,
}

#[derive(Debug, Clone)]
struct DenseLayer {
  weights:    Array2<f64>,
  bias:       Array1<f64>,
  activation: Activation,
}

#[derive(Debug, Clone)]
pub struct LstmModel {
  lstm:    Vec<LstmLayer>,
  dense:   Vec<DenseLayer>,
  dropout: f64,
  inputs:  usize,
}

impl LstmModel {
  pub fn from_json(json: &str) -> Result<Self> {
    Self::from_artifact(serde_json::from_str(json)?)
  }

  pub fn from_artifact(artifact: LstmArtifact) -> Result<Self> {
    if artifact.lstm.is_empty() || artifact.dense.is_empty() {
      return Err(Error::InvalidArtifact("need at least one LSTM and one dense layer".into()));
    }
    if !(0.0..1.0).contains(&artifact.dropout) {
      return Err(Error::InvalidArtifact(format!("dropout {} outside [0, 1)", artifact.dropout)));
    }

    let mut lstm = Vec::with_capacity(artifact.lstm.len());
    let mut width = None;
    for (i, spec) in artifact.lstm.into_iter().enumerate() {
      let w_input = matrix(&spec.w_input, &format!("lstm[{i}].w_input"))?;
      let w_recurrent = matrix(&spec.w_recurrent, &format!("lstm[{i}].w_recurrent"))?;
      let hidden = w_recurrent.ncols();
      if hidden == 0 {
        return Err(Error::InvalidArtifact(format!("lstm[{i}] has no units")));
      }
      check(4 * hidden, w_input.nrows())?;
      check(4 * hidden, w_recurrent.nrows())?;
      check(4 * hidden, spec.bias.len())?;
      if let Some(prev) = width {
        check(prev, w_input.ncols())?;
      }
      width = Some(hidden);
      ensure_finite(spec.bias.iter().copied(), "lstm bias")?;
      lstm.push(LstmLayer { w_input, w_recurrent, bias: Array1::from(spec.bias), hidden });
    }
    let inputs = lstm[0].w_input.ncols();

    let mut dense = Vec::with_capacity(artifact.dense.len());
    let mut width = width.unwrap_or_default();
    for (i, spec) in artifact.dense.into_iter().enumerate() {
      let weights = matrix(&spec.weights, &format!("dense[{i}].weights"))?;
      check(width, weights.ncols())?;
      check(weights.nrows(), spec.bias.len())?;
      ensure_finite(spec.bias.iter().copied(), "dense bias")?;
      width = weights.nrows();
      dense.push(DenseLayer { weights, bias: Array1::from(spec.bias), activation: spec.activation });
    }
    check(1, width)?;

    Ok(Self { lstm, dense, dropout: artifact.dropout, inputs })
  }

  pub fn dropout(&self) -> f64 { self.dropout }

  /// An inverted-dropout mask of `len` entries, or all ones without `rng`.
  fn mask(&self, len: usize, rng: &mut Option<&mut dyn RngCore>) -> Array1<f64> {
    match rng {
      Some(rng) if self.dropout > 0.0 => {
        let keep = 1.0 - self.dropout;
        Array1::from_shape_fn(len, |_| if rng.gen_bool(keep) { 1.0 / keep } else { 0.0 })
      }
      _ => Array1::ones(len),
    }
  }
}

fn sigmoid(x: f64) -> f64 { 1.0 / (1.0 + (-x).exp()) }

impl LstmLayer {
  fn run(
    &self,
    sequence: ArrayView2<'_, f64>,
    input_mask: ArrayView1<'_, f64>,
    state_mask: ArrayView1<'_, f64>,
  ) -> Array2<f64> {
    let h_units = self.hidden;
    let mut h = Array1::<f64>::zeros(h_units);
    let mut c = Array1::<f64>::zeros(h_units);
    let mut out = Array2::<f64>::zeros((sequence.nrows(), h_units));

    for (t, x) in sequence.outer_iter().enumerate() {
      let x = &x * &input_mask;
      let r = &h * &state_mask;
      let z = self.w_input.dot(&x) + self.w_recurrent.dot(&r) + &self.bias;

      let i = z.slice(s![0..h_units]).mapv(sigmoid);
      let f = z.slice(s![h_units..2 * h_units]).mapv(sigmoid);
      let g = z.slice(s![2 * h_units..3 * h_units]).mapv(f64::tanh);
      let o = z.slice(s![3 * h_units..4 * h_units]).mapv(sigmoid);

      c = &f * &c + &i * &g;
      h = &o * &c.mapv(f64::tanh);
      out.row_mut(t).assign(&h);
    }
    out
  }
}

impl SequenceModel for LstmModel {
  fn input_width(&self) -> usize { self.inputs }

  fn forward(&self, window: ArrayView2<'_, f64>, rng: Option<&mut dyn RngCore>) -> Result<f64> {
    check(self.inputs, window.ncols())?;
    if window.nrows() == 0 {
      return Err(Error::ShapeMismatch { expected: 1, actual: 0 });
    }
    let mut rng = rng;

    let mut sequence = window.to_owned();
    for layer in &self.lstm {
      let input_mask = self.mask(sequence.ncols(), &mut rng);
      let state_mask = self.mask(layer.hidden, &mut rng);
      sequence = layer.run(sequence.view(), input_mask.view(), state_mask.view());
    }

    let last = sequence.nrows() - 1;
    let mut v = sequence.row(last).to_owned();
    for layer in &self.dense {
      let mask = self.mask(v.len(), &mut rng);
      v = layer.weights.dot(&(&v * &mask)) + &layer.bias;
      if layer.activation == Activation::Relu {
        v.mapv_inplace(|x| x.max(0.0));
      }
    }

    let y = v[0];
    if y.is_finite() { Ok(y) } else { Err(Error::NumericInstability("model output".into())) }
  }
}
