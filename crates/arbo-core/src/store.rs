//! The `WeeklyStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `arbo-store-sqlite`).
//! Ingestion and forecasting depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use crate::{
  feature::FeatureRow,
  forecast::ForecastRun,
  locality::Locality,
  weekly::{WeeklyCaseRow, WeeklyWeatherRow},
};

/// Abstraction over the persisted weekly tables.
///
/// Every batch write is atomic: either all rows of the batch are visible
/// afterwards or none are. Re-applying an identical batch leaves the tables
/// unchanged.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait WeeklyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Localities ────────────────────────────────────────────────────────

  /// Register localities by slug. Existing localities keep their name; only
  /// their null metadata fields are filled from the input.
  fn upsert_localities(
    &self,
    localities: Vec<Locality>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn list_localities(
    &self,
  ) -> impl Future<Output = Result<Vec<Locality>, Self::Error>> + Send + '_;

  // ── Weekly upserts ────────────────────────────────────────────────────

  /// Merge case rows keyed on `(locality, date)`: `cases` is overwritten,
  /// `total_cases` is overwritten only when the incoming value is present.
  fn upsert_weekly_cases(
    &self,
    rows: Vec<WeeklyCaseRow>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Merge weather rows keyed on `(locality, date)`: a null incoming value
  /// keeps the stored one, anything else overwrites it.
  fn upsert_weekly_weather(
    &self,
    rows: Vec<WeeklyWeatherRow>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Weekly reads ──────────────────────────────────────────────────────

  /// Case rows ordered by locality then date; all localities when `None`.
  fn weekly_cases(
    &self,
    locality: Option<String>,
  ) -> impl Future<Output = Result<Vec<WeeklyCaseRow>, Self::Error>> + Send + '_;

  /// Weather rows ordered by locality then date; all localities when `None`.
  fn weekly_weather(
    &self,
    locality: Option<String>,
  ) -> impl Future<Output = Result<Vec<WeeklyWeatherRow>, Self::Error>> + Send + '_;

  // ── Features ──────────────────────────────────────────────────────────

  /// Replace every feature row of `localities` with `rows` in one
  /// transaction.
  fn replace_features(
    &self,
    localities: Vec<String>,
    rows: Vec<FeatureRow>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Feature rows of one locality ordered by date.
  fn features(
    &self,
    locality: String,
  ) -> impl Future<Output = Result<Vec<FeatureRow>, Self::Error>> + Send + '_;

  // ── Forecast audit trail ──────────────────────────────────────────────

  /// Append a forecast run. Never overwrites an existing run.
  fn record_forecast(
    &self,
    run: ForecastRun,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Forecast runs of one locality, most recent first.
  fn forecasts(
    &self,
    locality: String,
  ) -> impl Future<Output = Result<Vec<ForecastRun>, Self::Error>> + Send + '_;
}
