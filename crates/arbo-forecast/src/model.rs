//! Sequence models and the artifact bundle they are loaded from.

use std::{fs, path::Path, sync::Arc};

use arbo_core::feature::TARGET;
use ndarray::ArrayView2;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, lstm::LstmModel, scaler::Scaler};

pub const METADATA_FILE: &str = "metadata.json";
pub const MODEL_FILE: &str = "model.json";
pub const X_SCALER_FILE: &str = "x_scaler.json";
pub const Y_SCALER_FILE: &str = "y_scaler.json";

/// A trained one-step-ahead predictor over a `(lookback, features)` window.
pub trait SequenceModel: Send + Sync {
  /// Number of features each window row must carry.
  fn input_width(&self) -> usize;

  /// Predict the next scaled target value.
  ///
  /// With `rng` present, dropout stays active and masks are drawn from it;
  /// with `None` the pass is deterministic.
  fn forward(&self, window: ArrayView2<'_, f64>, rng: Option<&mut dyn RngCore>) -> Result<f64>;
}

// ─── Metadata ────────────────────────────────────────────────────────────────

fn default_model_name() -> String { "global_lstm".into() }

fn default_target() -> String { TARGET.into() }

fn default_mc_samples() -> usize { 50 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
  #[serde(default = "default_model_name")]
  pub model_name:    String,
  pub lookback:      usize,
  #[serde(alias = "features")]
  pub feature_order: Vec<String>,
  #[serde(default = "default_target")]
  pub target_col:    String,
  #[serde(default = "default_mc_samples")]
  pub mc_samples:    usize,
}

impl ModelMetadata {
  /// Position of the target in `feature_order`.
  pub fn target_index(&self) -> Result<usize> {
    self
      .feature_order
      .iter()
      .position(|f| *f == self.target_col)
      .ok_or_else(|| {
        Error::InvalidArtifact(format!("target {:?} is not in feature_order", self.target_col))
      })
  }

  pub fn validate(&self) -> Result<()> {
    if self.lookback == 0 {
      return Err(Error::InvalidArtifact("lookback must be at least 1".into()));
    }
    if self.mc_samples == 0 {
      return Err(Error::InvalidArtifact("mc_samples must be at least 1".into()));
    }
    self.target_index().map(|_| ())
  }
}

// ─── Bundle ──────────────────────────────────────────────────────────────────

/// Everything one trained model needs at inference time.
pub struct ModelBundle {
  pub metadata: ModelMetadata,
  pub model:    Arc<dyn SequenceModel>,
  x_scaler:     Option<Scaler>,
  y_scaler:     Option<Scaler>,
}

impl std::fmt::Debug for ModelBundle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ModelBundle")
      .field("metadata", &self.metadata)
      .field("x_scaler", &self.x_scaler.is_some())
      .field("y_scaler", &self.y_scaler.is_some())
      .finish_non_exhaustive()
  }
}

impl ModelBundle {
  /// Assemble and check a bundle.
  pub fn new(
    metadata: ModelMetadata,
    model: Arc<dyn SequenceModel>,
    x_scaler: Option<Scaler>,
    y_scaler: Option<Scaler>,
  ) -> Result<Self> {
    metadata.validate()?;
    let width = metadata.feature_order.len();
    if model.input_width() != width {
      return Err(Error::ShapeMismatch { expected: width, actual: model.input_width() });
    }
    if let Some(x) = &x_scaler {
      x.validate()?;
      if x.width() != width {
        return Err(Error::ShapeMismatch { expected: width, actual: x.width() });
      }
    }
    if let Some(y) = &y_scaler {
      y.validate()?;
      if y.width() != 1 {
        return Err(Error::ShapeMismatch { expected: 1, actual: y.width() });
      }
    }
    Ok(Self { metadata, model, x_scaler, y_scaler })
  }

  /// Load a bundle from a model directory.
  ///
  /// A missing metadata or weights file is [`Error::ModelUnavailable`]; a
  /// present but malformed one is an error of its own.
  pub fn load(dir: &Path) -> Result<Self> {
    let metadata_path = dir.join(METADATA_FILE);
    let model_path = dir.join(MODEL_FILE);
    for required in [&metadata_path, &model_path] {
      if !required.is_file() {
        return Err(Error::ModelUnavailable(format!("{} not found", required.display())));
      }
    }

    let metadata: ModelMetadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
    let model = LstmModel::from_json(&fs::read_to_string(&model_path)?)?;
    let x_scaler = read_optional(&dir.join(X_SCALER_FILE))?;
    let y_scaler = read_optional(&dir.join(Y_SCALER_FILE))?;

    Self::new(metadata, Arc::new(model), x_scaler, y_scaler)
  }

  /// The persisted input scaler, or [`Error::ScalerMissing`].
  pub fn x_scaler(&self) -> Result<&Scaler> {
    self.x_scaler.as_ref().ok_or(Error::ScalerMissing("input"))
  }

  /// The persisted target scaler, or [`Error::ScalerMissing`].
  pub fn y_scaler(&self) -> Result<&Scaler> {
    self.y_scaler.as_ref().ok_or(Error::ScalerMissing("target"))
  }
}

fn read_optional(path: &Path) -> Result<Option<Scaler>> {
  if !path.is_file() {
    return Ok(None);
  }
  Ok(Some(serde_json::from_str(&fs::read_to_string(path)?)?))
}
