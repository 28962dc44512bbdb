//! Feature building and probabilistic forecasting for Arbo.
//!
//! [`FeatureBuilder`] turns the weekly tables into lagged, smoothed and
//! seasonally encoded rows. [`ForecastEngine`] feeds the most recent window of
//! those rows to a trained sequence model many times with dropout left on
//! (Monte Carlo Dropout) and reduces the samples to a point forecast with a
//! 10th/90th percentile band. Without a model it degrades to a
//! [naive forecast](NaiveMethod).

pub mod engine;
pub mod error;
pub mod features;
pub mod lstm;
pub mod model;
pub mod model_store;
pub mod naive;
pub mod rollout;
pub mod scaler;

pub use engine::{EngineConfig, Forecast, ForecastEngine, ForecastMetadata};
pub use error::{Error, Result};
pub use features::{FeatureBuilder, SeasonalOrigin, rebuild_features};
pub use model::{ModelBundle, ModelMetadata, SequenceModel};
pub use model_store::ModelStore;
pub use naive::NaiveMethod;
pub use scaler::Scaler;
