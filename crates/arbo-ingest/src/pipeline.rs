//! One ingestion run: normalize → resolve → aggregate → upsert.

use arbo_core::{
  locality::{Locality, LocalityResolver, ResolveMode},
  store::WeeklyStore,
  week::WeekAnchor,
  weekly::{WeeklyCaseRow, WeeklyWeatherRow},
};
use tracing::{info, warn};

use crate::{
  Error, Result,
  aggregate::{weekly_cases, weekly_weather},
  normalize::{Normalized, Source, normalize},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
  pub anchor:       WeekAnchor,
  pub resolve_mode: ResolveMode,
}

/// A source left out of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
  pub origin: String,
  pub reason: String,
}

/// What an ingestion run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
  pub sources_read:   usize,
  pub skipped:        Vec<SkippedSource>,
  pub new_localities: usize,
  /// Weekly rows written, after aggregation.
  pub case_rows:      usize,
  pub weather_rows:   usize,
}

pub(crate) fn store_error<E>(e: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Store(Box::new(e))
}

/// Canonical name for `candidate`, registering it when lenient resolution
/// lets an unknown name through.
fn canonical(
  resolver: &mut LocalityResolver,
  fresh: &mut Vec<Locality>,
  candidate: &str,
) -> Result<String> {
  if let Some(name) = resolver.lookup(candidate) {
    return Ok(name.to_string());
  }
  let name = resolver.resolve(candidate)?;
  resolver.register(name.clone());
  fresh.push(Locality::new(name.clone()));
  Ok(name)
}

/// Ingest `sources` into `store`.
///
/// Sources without a usable schema are skipped with a warning. Everything
/// else is resolved and aggregated jointly before any write, so a resolution
/// failure leaves the store untouched; each table is then written as one
/// atomic batch.
pub async fn ingest<S: WeeklyStore>(
  store: &S,
  sources: &[Source],
  options: IngestOptions,
) -> Result<IngestReport> {
  let known = store.list_localities().await.map_err(store_error)?;
  let mut resolver =
    LocalityResolver::new(known.into_iter().map(|l| l.name), options.resolve_mode);

  let mut report = IngestReport::default();
  let mut fresh = Vec::new();
  let mut cases = Vec::new();
  let mut weather = Vec::new();

  for source in sources {
    let normalized = match normalize(source) {
      Ok(n) => n,
      Err(Error::SchemaMismatch { origin, reason }) => {
        warn!(%origin, %reason, "skipping source");
        report.skipped.push(SkippedSource { origin, reason });
        continue;
      }
      Err(e) => return Err(e),
    };
    tracing::debug!(origin = %source.origin, rows = normalized.len(), "normalized source");
    report.sources_read += 1;

    match normalized {
      Normalized::Cases(rows) => {
        for mut row in rows {
          row.locality = canonical(&mut resolver, &mut fresh, &row.locality)?;
          cases.push(row);
        }
      }
      Normalized::Weather(rows) => {
        for mut row in rows {
          row.locality = canonical(&mut resolver, &mut fresh, &row.locality)?;
          weather.push(row);
        }
      }
    }
  }

  let cases = weekly_cases(cases, options.anchor);
  let weather = weekly_weather(weather, options.anchor);
  check_anchored(options.anchor, &cases, &weather)?;

  report.new_localities = store.upsert_localities(fresh).await.map_err(store_error)?;
  (report.case_rows, report.weather_rows) = upsert_weekly(store, cases, weather).await?;

  info!(
    sources = report.sources_read,
    skipped = report.skipped.len(),
    localities = report.new_localities,
    cases = report.case_rows,
    weather = report.weather_rows,
    "ingestion finished"
  );
  Ok(report)
}

/// Upsert already-weekly rows, rejecting the whole batch with
/// [`UnanchoredDate`](arbo_core::Error::UnanchoredDate) before any write when
/// a row is not dated on an `anchor` weekday.
pub async fn write_weekly<S: WeeklyStore>(
  store: &S,
  cases: Vec<WeeklyCaseRow>,
  weather: Vec<WeeklyWeatherRow>,
  anchor: WeekAnchor,
) -> Result<(usize, usize)> {
  check_anchored(anchor, &cases, &weather)?;
  upsert_weekly(store, cases, weather).await
}

fn check_anchored(
  anchor: WeekAnchor,
  cases: &[WeeklyCaseRow],
  weather: &[WeeklyWeatherRow],
) -> Result<()> {
  for date in cases.iter().map(|r| r.date).chain(weather.iter().map(|r| r.date)) {
    anchor.check(date)?;
  }
  Ok(())
}

async fn upsert_weekly<S: WeeklyStore>(
  store: &S,
  cases: Vec<WeeklyCaseRow>,
  weather: Vec<WeeklyWeatherRow>,
) -> Result<(usize, usize)> {
  let case_rows = store.upsert_weekly_cases(cases).await.map_err(store_error)?;
  let weather_rows = store.upsert_weekly_weather(weather).await.map_err(store_error)?;
  Ok((case_rows, weather_rows))
}
