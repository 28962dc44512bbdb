//! Forecast Engine: MC Dropout forecasts with a naive fallback tier.

use std::sync::Arc;

use arbo_core::{
  feature::{FeatureRow, TARGET},
  forecast::{Confidence, ForecastRun, ScalingSource},
  locality::{LocalityResolver, ResolveMode},
  store::WeeklyStore,
  week::WeekAnchor,
};
use chrono::{NaiveDate, Utc};
use ndarray::{Array2, s};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  error::store_error,
  features::{FeatureBuilder, SeasonalOrigin},
  model::ModelBundle,
  model_store::ModelStore,
  naive::NaiveMethod,
  rollout::{Feedback, monte_carlo, reduce},
  scaler::Scaler,
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub anchor:          WeekAnchor,
  pub resolve_mode:    ResolveMode,
  /// Used when features have to be built on the fly.
  pub seasonal_origin: SeasonalOrigin,
  /// Overrides the sample count from the model metadata.
  pub mc_samples:      Option<usize>,
  /// Base seed; sample `i` uses `seed + i`. Random when unset.
  pub seed:            Option<u64>,
  pub lower_quantile:  f64,
  pub upper_quantile:  f64,
  pub naive_method:    NaiveMethod,
  /// Append every forecast to the audit trail.
  pub record_runs:     bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      anchor:          WeekAnchor::default(),
      resolve_mode:    ResolveMode::default(),
      seasonal_origin: SeasonalOrigin::default(),
      mc_samples:      None,
      seed:            None,
      lower_quantile:  0.1,
      upper_quantile:  0.9,
      naive_method:    NaiveMethod::default(),
      record_runs:     true,
    }
  }
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// Provenance of one forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetadata {
  pub model_name:      String,
  pub lookback:        Option<usize>,
  pub feature_order:   Vec<String>,
  pub target_col:      String,
  pub mc_samples:      Option<usize>,
  pub scaling:         ScalingSource,
  pub seed:            Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
  pub locality:   String,
  pub dates:      Vec<NaiveDate>,
  pub yhat:       Vec<f64>,
  pub yhat_p10:   Vec<f64>,
  pub yhat_p90:   Vec<f64>,
  pub confidence: Confidence,
  pub metadata:   ForecastMetadata,
}

impl Forecast {
  fn to_run(&self) -> Result<ForecastRun> {
    let start_date = *self.dates.first().ok_or(Error::InvalidHorizon)?;
    Ok(ForecastRun {
      locality: self.locality.clone(),
      run_at: Utc::now(),
      model_name: self.metadata.model_name.clone(),
      horizon: self.dates.len(),
      start_date,
      yhat: self.yhat.clone(),
      lower: self.yhat_p10.clone(),
      upper: self.yhat_p90.clone(),
      scaling: self.metadata.scaling,
      confidence: self.confidence,
      metadata: serde_json::to_value(&self.metadata)?,
    })
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct ForecastEngine<S> {
  store:  S,
  models: Arc<ModelStore>,
  config: EngineConfig,
}

impl<S: WeeklyStore> ForecastEngine<S> {
  pub fn new(store: S, models: Arc<ModelStore>, config: EngineConfig) -> Self {
    Self { store, models, config }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn models(&self) -> &ModelStore { &self.models }

  pub fn config(&self) -> &EngineConfig { &self.config }

  /// Forecast `horizon` weeks for `locality`.
  ///
  /// Only a missing model degrades to the naive tier; every other failure,
  /// including a broken artifact, is returned as is.
  pub async fn forecast(&self, locality: &str, horizon: usize) -> Result<Forecast> {
    if horizon == 0 {
      return Err(Error::InvalidHorizon);
    }
    let locality = self.resolve(locality).await?;

    let forecast = match self.models.get_or_load().await {
      Ok(bundle) => self.model_forecast(&locality, bundle, horizon).await?,
      Err(Error::ModelUnavailable(reason)) => {
        warn!(%locality, %reason, "no trained model, falling back to naive forecast");
        self.naive_forecast(&locality, horizon, reason).await?
      }
      Err(e) => return Err(e),
    };

    if self.config.record_runs {
      self.store.record_forecast(forecast.to_run()?).await.map_err(store_error)?;
    }
    info!(
      locality = %forecast.locality,
      model = %forecast.metadata.model_name,
      horizon,
      start = %forecast.dates[0],
      "forecast produced"
    );
    Ok(forecast)
  }

  /// Recorded forecast runs of `locality`, most recent first.
  pub async fn runs(&self, locality: &str) -> Result<Vec<ForecastRun>> {
    let locality = self.resolve(locality).await?;
    self.store.forecasts(locality).await.map_err(store_error)
  }

  async fn resolve(&self, candidate: &str) -> Result<String> {
    let known = self.store.list_localities().await.map_err(store_error)?;
    let resolver = LocalityResolver::new(known.into_iter().map(|l| l.name), self.config.resolve_mode);
    Ok(resolver.resolve(candidate)?)
  }

  /// Feature rows of `locality`.
  ///
  /// Stored rows are used only when they reach the latest weekly case row;
  /// otherwise (nothing stored, or new weeks ingested since the last
  /// rebuild) rows are built in memory from the weekly tables.
  async fn feature_rows(&self, locality: &str) -> Result<Vec<FeatureRow>> {
    let stored = self.store.features(locality.to_string()).await.map_err(store_error)?;
    let observed = self.store.weekly_cases(Some(locality.to_string())).await.map_err(store_error)?;
    let latest = observed.last().map(|r| r.date);
    if !stored.is_empty() && stored.last().map(|r| r.date) == latest {
      return Ok(stored);
    }
    if stored.is_empty() {
      debug!(%locality, "no stored features, building in memory");
    } else {
      warn!(%locality, "stored features are behind the weekly cases, building in memory");
    }
    let cases = self.store.weekly_cases(None).await.map_err(store_error)?;
    let weather = self.store.weekly_weather(None).await.map_err(store_error)?;
    let mut rows = FeatureBuilder::new(self.config.seasonal_origin).build(&cases, &weather);
    rows.retain(|r| r.locality == locality);
    Ok(rows)
  }

  async fn model_forecast(
    &self,
    locality: &str,
    bundle: Arc<ModelBundle>,
    horizon: usize,
  ) -> Result<Forecast> {
    let meta = &bundle.metadata;
    let lookback = meta.lookback;
    let width = meta.feature_order.len();
    let target_index = meta.target_index()?;

    // Rows without the full target lag history never enter a window.
    let rows = self.feature_rows(locality).await?;
    let usable: Vec<(NaiveDate, Vec<f64>)> = rows
      .iter()
      .filter(|r| r.has_full_history())
      .filter_map(|r| r.vector(&meta.feature_order).map(|v| (r.date, v)))
      .collect();
    if usable.len() < lookback {
      return Err(Error::InsufficientHistory {
        locality:  locality.to_string(),
        required:  lookback,
        available: usable.len(),
      });
    }
    let n = usable.len();
    let last_date = usable[n - 1].0;
    let flat: Vec<f64> = usable.into_iter().flat_map(|(_, v)| v).collect();
    let history = Array2::from_shape_vec((n, width), flat)
      .map_err(|e| Error::InvalidArtifact(e.to_string()))?;

    let loaded = match bundle.x_scaler() {
      Ok(s) => Some(s),
      Err(Error::ScalerMissing(which)) => {
        warn!(%locality, which, "no persisted scaler, fitting min/max on history");
        None
      }
      Err(e) => return Err(e),
    };
    let (x_scaler, fitted) = Scaler::fit_or_load(loaded, history.view())?;
    let y_scaler = match bundle.y_scaler() {
      Ok(s) => s.clone(),
      Err(Error::ScalerMissing(_)) => x_scaler.column(target_index)?,
      Err(e) => return Err(e),
    };
    let scaling = if fitted { ScalingSource::FittedOnHistory } else { ScalingSource::Loaded };

    let window = x_scaler.transform(history.slice(s![n - lookback.., ..]))?;
    let samples = self.config.mc_samples.unwrap_or(meta.mc_samples).max(1);
    let seed = self.config.seed.unwrap_or_else(rand::random);
    let (lower_q, upper_q) = (self.config.lower_quantile, self.config.upper_quantile);

    let model = Arc::clone(&bundle);
    let (yhat, lower, upper) = tokio::task::spawn_blocking(move || {
      let feedback = Feedback { target_index, x: &x_scaler, y: &y_scaler };
      let matrix =
        monte_carlo(model.model.as_ref(), window.view(), &feedback, horizon, samples, seed)?;
      let band = reduce(matrix.view(), lower_q, upper_q);
      let clamp = |v: Vec<f64>| v.into_iter().map(|x| x.max(0.0)).collect::<Vec<_>>();
      Ok::<_, Error>((
        clamp(y_scaler.inverse(&band.mean)?),
        clamp(y_scaler.inverse(&band.lower)?),
        clamp(y_scaler.inverse(&band.upper)?),
      ))
    })
    .await??;

    Ok(Forecast {
      locality:   locality.to_string(),
      dates:      self.config.anchor.following(last_date, horizon),
      yhat,
      yhat_p10:   lower,
      yhat_p90:   upper,
      confidence: Confidence::Model,
      metadata:   ForecastMetadata {
        model_name:      meta.model_name.clone(),
        lookback:        Some(lookback),
        feature_order:   meta.feature_order.clone(),
        target_col:      meta.target_col.clone(),
        mc_samples:      Some(samples),
        scaling,
        seed:            Some(seed),
        fallback_reason: None,
      },
    })
  }

  async fn naive_forecast(&self, locality: &str, horizon: usize, reason: String) -> Result<Forecast> {
    let cases = self.store.weekly_cases(Some(locality.to_string())).await.map_err(store_error)?;
    let history: Vec<f64> = cases.iter().map(|c| c.cases as f64).collect();
    let method = self.config.naive_method;

    let (Some(yhat), Some(last)) = (method.forecast(&history, horizon), cases.last()) else {
      return Err(Error::InsufficientHistory {
        locality:  locality.to_string(),
        required:  1,
        available: 0,
      });
    };

    Ok(Forecast {
      locality:   locality.to_string(),
      dates:      self.config.anchor.following(last.date, horizon),
      yhat_p10:   yhat.clone(),
      yhat_p90:   yhat.clone(),
      yhat,
      confidence: Confidence::Low,
      metadata:   ForecastMetadata {
        model_name:      method.model_name().to_string(),
        lookback:        None,
        feature_order:   vec![TARGET.to_string()],
        target_col:      TARGET.to_string(),
        mc_samples:      None,
        scaling:         ScalingSource::None,
        seed:            None,
        fallback_reason: Some(reason),
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use arbo_core::{locality::Locality, weekly::WeeklyCaseRow};
  use arbo_store_sqlite::SqliteStore;
  use chrono::Days;
  use ndarray::ArrayView2;
  use rand::{Rng, RngCore};

  use super::*;
  use crate::{features::rebuild_features, model::{ModelMetadata, SequenceModel}};

  /// Repeats the last target, jittered by dropout.
  struct Drift;

  impl SequenceModel for Drift {
    fn input_width(&self) -> usize { 2 }

    fn forward(&self, window: ArrayView2<'_, f64>, rng: Option<&mut dyn RngCore>) -> Result<f64> {
      let last = window[[window.nrows() - 1, 0]];
      Ok(last + rng.map_or(0.0, |r| r.gen_range(-0.05..0.05)))
    }
  }

  fn week(k: u64) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 1, 7).unwrap() + Days::new(7 * k) }

  fn bundle() -> ModelBundle {
    let metadata = ModelMetadata {
      model_name:    "drift".into(),
      lookback:      12,
      feature_order: vec!["cases".into(), "cases_lag1".into()],
      target_col:    "cases".into(),
      mc_samples:    32,
    };
    ModelBundle::new(metadata, Arc::new(Drift), None, None).unwrap()
  }

  async fn seeded(weeks: u64) -> SqliteStore {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store.upsert_localities(vec![Locality::new("Diamantina")]).await.unwrap();
    let rows = (0..weeks)
      .map(|k| WeeklyCaseRow::new("Diamantina", week(k), 10 + k as i64))
      .collect();
    store.upsert_weekly_cases(rows).await.unwrap();
    store
  }

  fn config() -> EngineConfig { EngineConfig { seed: Some(3), ..EngineConfig::default() } }

  fn with_model(store: SqliteStore) -> ForecastEngine<SqliteStore> {
    ForecastEngine::new(store, Arc::new(ModelStore::preloaded("unused", bundle())), config())
  }

  #[tokio::test]
  async fn forecast_dates_follow_the_last_week() {
    let engine = with_model(seeded(24).await);
    let f = engine.forecast("Diamantina", 4).await.unwrap();

    assert_eq!(f.dates.len(), 4);
    assert_eq!(f.dates[0], week(24));
    for pair in f.dates.windows(2) {
      assert_eq!((pair[1] - pair[0]).num_days(), 7);
    }
    assert_eq!(f.confidence, Confidence::Model);
    assert_eq!(f.metadata.scaling, ScalingSource::FittedOnHistory);
    assert_eq!(f.metadata.lookback, Some(12));
  }

  #[tokio::test]
  async fn bands_bracket_the_point_forecast() {
    let engine = with_model(seeded(24).await);
    let f = engine.forecast("Diamantina", 6).await.unwrap();

    assert_eq!(f.yhat.len(), 6);
    assert_eq!(f.yhat_p10.len(), 6);
    assert_eq!(f.yhat_p90.len(), 6);
    for h in 0..6 {
      assert!(f.yhat_p10[h] <= f.yhat[h] && f.yhat[h] <= f.yhat_p90[h]);
      assert!(f.yhat_p10[h] >= 0.0);
    }
    // The model repeats the last value, so the point forecast stays near 33.
    assert!((f.yhat[0] - 33.0).abs() < 1.0);
  }

  #[tokio::test]
  async fn rows_without_full_lag_history_are_not_usable() {
    // Only the last three of fifteen weeks carry all twelve target lags,
    // even though every row after the first has `cases_lag1`.
    let engine = with_model(seeded(15).await);
    match engine.forecast("Diamantina", 2).await {
      Err(Error::InsufficientHistory { required: 12, available, .. }) => assert_eq!(available, 3),
      other => panic!("expected InsufficientHistory, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn window_ends_at_the_last_full_history_row() {
    let engine = with_model(seeded(25).await);
    let f = engine.forecast("Diamantina", 1).await.unwrap();
    assert_eq!(f.dates, vec![week(25)]);
  }

  #[tokio::test]
  async fn stale_stored_features_are_not_used() {
    let store = seeded(24).await;
    rebuild_features(&store, &FeatureBuilder::default(), None, ResolveMode::Lenient).await.unwrap();
    let later = (24..28).map(|k| WeeklyCaseRow::new("Diamantina", week(k), 40)).collect();
    store.upsert_weekly_cases(later).await.unwrap();
    let engine = with_model(store);

    let f = engine.forecast("Diamantina", 2).await.unwrap();
    assert_eq!(f.dates, vec![week(28), week(29)]);
  }

  #[tokio::test]
  async fn stored_features_are_used_when_present() {
    let store = seeded(24).await;
    rebuild_features(&store, &FeatureBuilder::default(), None, ResolveMode::Lenient).await.unwrap();
    let engine = with_model(store);

    let f = engine.forecast("diamantina", 2).await.unwrap();
    assert_eq!(f.locality, "Diamantina");
    assert_eq!(f.dates, vec![week(24), week(25)]);
  }

  #[tokio::test]
  async fn short_history_is_an_error() {
    let engine = with_model(seeded(5).await);
    match engine.forecast("Diamantina", 4).await {
      Err(Error::InsufficientHistory { required: 12, available, .. }) => assert_eq!(available, 0),
      other => panic!("expected InsufficientHistory, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn zero_horizon_is_rejected() {
    let engine = with_model(seeded(24).await);
    assert!(matches!(engine.forecast("Diamantina", 0).await, Err(Error::InvalidHorizon)));
  }

  #[tokio::test]
  async fn missing_model_degrades_to_naive() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ForecastEngine::new(seeded(6).await, Arc::new(ModelStore::new(dir.path())), config());

    let f = engine.forecast("Diamantina", 3).await.unwrap();
    assert_eq!(f.confidence, Confidence::Low);
    assert_eq!(f.metadata.model_name, "naive_mean_4");
    // Mean of 12, 13, 14, 15.
    assert_eq!(f.yhat, vec![14.0; 3]);
    assert_eq!(f.yhat_p10, f.yhat);
    assert_eq!(f.yhat_p90, f.yhat);
    assert_eq!(f.dates[0], week(6));
    assert!(f.metadata.fallback_reason.is_some());
  }

  #[tokio::test]
  async fn naive_without_any_rows_is_insufficient() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open_in_memory().await.unwrap();
    let engine = ForecastEngine::new(store, Arc::new(ModelStore::new(dir.path())), config());

    assert!(matches!(
      engine.forecast("Nowhere", 2).await,
      Err(Error::InsufficientHistory { available: 0, .. })
    ));
  }

  #[tokio::test]
  async fn strict_mode_rejects_unknown_localities() {
    let config = EngineConfig { resolve_mode: ResolveMode::Strict, ..config() };
    let engine =
      ForecastEngine::new(seeded(24).await, Arc::new(ModelStore::preloaded("unused", bundle())), config);
    assert!(matches!(
      engine.forecast("Atlantis", 2).await,
      Err(Error::Core(arbo_core::Error::LocalityNotFound(_)))
    ));
  }

  #[tokio::test]
  async fn runs_are_recorded() {
    let engine = with_model(seeded(24).await);
    let f = engine.forecast("Diamantina", 4).await.unwrap();

    let runs = engine.runs("Diamantina").await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].model_name, "drift");
    assert_eq!(runs[0].start_date, f.dates[0]);
    assert_eq!(runs[0].yhat, f.yhat);
    assert_eq!(runs[0].metadata["lookback"], 12);
  }

  #[tokio::test]
  async fn recording_can_be_disabled() {
    let config = EngineConfig { record_runs: false, ..config() };
    let engine =
      ForecastEngine::new(seeded(24).await, Arc::new(ModelStore::preloaded("unused", bundle())), config);
    engine.forecast("Diamantina", 1).await.unwrap();
    assert!(engine.runs("Diamantina").await.unwrap().is_empty());
  }
}
