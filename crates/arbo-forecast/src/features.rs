//! Feature Builder: lags, rolling means and seasonal encodings per locality.
//!
//! Weather is left-joined onto cases by `(locality, week)`. Every derived
//! column is computed inside one locality's date-ordered series, so nothing
//! leaks between localities. Lags shift by rows of that series.

use std::{
  collections::{BTreeMap, HashMap},
  f64::consts::TAU,
};

use arbo_core::{
  feature::{
    EXOGENOUS, EXOGENOUS_LAGS, FeatureRow, ROLLING_WINDOWS, SEASON_WEEKS, SeriesFeatures,
    TARGET_LAGS,
  },
  locality::{LocalityResolver, ResolveMode},
  store::WeeklyStore,
  weekly::{WeeklyCaseRow, WeeklyWeatherRow},
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Result, error::store_error};

/// Where elapsed weeks for the seasonal encoding are counted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalOrigin {
  /// The earliest week across all localities, so phases line up between
  /// localities.
  #[default]
  Global,
  /// Each locality's own first week.
  PerLocality,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureBuilder {
  origin: SeasonalOrigin,
}

impl FeatureBuilder {
  pub fn new(origin: SeasonalOrigin) -> Self { Self { origin } }

  pub fn origin(&self) -> SeasonalOrigin { self.origin }

  /// Derive feature rows for every locality in `cases`, ordered by locality
  /// then date.
  pub fn build(&self, cases: &[WeeklyCaseRow], weather: &[WeeklyWeatherRow]) -> Vec<FeatureRow> {
    let weather: HashMap<(&str, NaiveDate), &WeeklyWeatherRow> = weather
      .iter()
      .map(|w| ((w.locality.as_str(), w.date), w))
      .collect();

    let mut series: BTreeMap<&str, Vec<&WeeklyCaseRow>> = BTreeMap::new();
    for row in cases {
      series.entry(row.locality.as_str()).or_default().push(row);
    }

    let global_origin = cases.iter().map(|c| c.date).min();

    let mut out = Vec::with_capacity(cases.len());
    for (locality, mut rows) in series {
      rows.sort_by_key(|r| r.date);
      let origin = match self.origin {
        SeasonalOrigin::Global => global_origin,
        SeasonalOrigin::PerLocality => rows.first().map(|r| r.date),
      };
      let Some(origin) = origin else { continue };

      let target: Vec<Option<f64>> = rows.iter().map(|r| Some(r.cases as f64)).collect();
      let exogenous: Vec<Vec<Option<f64>>> = EXOGENOUS
        .iter()
        .map(|name| {
          rows
            .iter()
            .map(|r| weather.get(&(locality, r.date)).and_then(|w| measure(w, name)))
            .collect()
        })
        .collect();

      for (i, row) in rows.iter().enumerate() {
        let series_at = |values: &[Option<f64>]| SeriesFeatures {
          value: values[i],
          lags:  EXOGENOUS_LAGS.map(|k| lag(values, i, k)),
          means: ROLLING_WINDOWS.map(|w| trailing_mean(values, i, w)),
        };
        let (sin, cos) = seasonal(origin, row.date);
        out.push(FeatureRow {
          locality:     locality.to_string(),
          date:         row.date,
          target:       row.cases as f64,
          target_lags:  TARGET_LAGS.map(|k| lag(&target, i, k)),
          target_means: ROLLING_WINDOWS.map(|w| trailing_mean(&target, i, w)),
          temp:         series_at(&exogenous[0]),
          prec:         series_at(&exogenous[1]),
          umid:         series_at(&exogenous[2]),
          seasonal_sin: sin,
          seasonal_cos: cos,
          month:        row.date.month(),
        });
      }
    }
    out
  }
}

fn measure(w: &WeeklyWeatherRow, name: &str) -> Option<f64> {
  match name {
    "temp" => w.temp,
    "prec" => w.prec,
    "umid" => w.umid,
    _ => None,
  }
}

fn lag(values: &[Option<f64>], i: usize, k: usize) -> Option<f64> {
  i.checked_sub(k).and_then(|j| values[j])
}

/// Mean of the observed values among rows `i + 1 - w ..= i`; `None` only
/// when none of them is observed.
fn trailing_mean(values: &[Option<f64>], i: usize, w: usize) -> Option<f64> {
  let start = (i + 1).saturating_sub(w);
  let (sum, n) = values[start..=i]
    .iter()
    .flatten()
    .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
  (n > 0).then(|| sum / n as f64)
}

fn seasonal(origin: NaiveDate, date: NaiveDate) -> (f64, f64) {
  let weeks = (date - origin).num_days() as f64 / 7.0;
  let phase = TAU * weeks / SEASON_WEEKS;
  (phase.sin(), phase.cos())
}

/// Rebuild the `features_weekly` rows of `localities` (all localities when
/// `None`) from the stored weekly tables, in one replacing write.
///
/// Requested names are resolved against the registered localities with
/// `mode` first, so `teofilo_otoni` rebuilds `Teófilo Otoni`.
///
/// The whole history is always read so the global seasonal origin stays
/// stable whichever subset is rebuilt.
pub async fn rebuild_features<S: WeeklyStore>(
  store: &S,
  builder: &FeatureBuilder,
  localities: Option<Vec<String>>,
  mode: ResolveMode,
) -> Result<usize> {
  let cases = store.weekly_cases(None).await.map_err(store_error)?;
  let weather = store.weekly_weather(None).await.map_err(store_error)?;

  let mut rows = builder.build(&cases, &weather);
  let targets = match localities {
    Some(requested) => {
      let known = store.list_localities().await.map_err(store_error)?;
      let resolver = LocalityResolver::new(known.into_iter().map(|l| l.name), mode);
      let only = requested
        .iter()
        .map(|name| resolver.resolve(name))
        .collect::<std::result::Result<Vec<_>, _>>()?;
      for name in &only {
        if !cases.iter().any(|c| &c.locality == name) {
          warn!(locality = %name, "no weekly case rows to build features from");
        }
      }
      rows.retain(|r| only.contains(&r.locality));
      only
    }
    None => {
      let mut all: Vec<String> = cases.into_iter().map(|c| c.locality).collect();
      all.dedup();
      all
    }
  };

  let localities = targets.len();
  let written = store.replace_features(targets, rows).await.map_err(store_error)?;
  info!(localities, rows = written, "rebuilt features");
  Ok(written)
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use arbo_core::locality::Locality;
  use arbo_store_sqlite::SqliteStore;
  use chrono::Days;

  use super::*;

  fn week(k: u64) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 1, 7).unwrap() + Days::new(7 * k) }

  fn cases(locality: &str, counts: &[i64]) -> Vec<WeeklyCaseRow> {
    counts
      .iter()
      .enumerate()
      .map(|(k, &c)| WeeklyCaseRow::new(locality, week(k as u64), c))
      .collect()
  }

  #[test]
  fn target_lags_fill_after_twelve_weeks() {
    let counts: Vec<i64> = (1..=14).collect();
    let rows = FeatureBuilder::default().build(&cases("Diamantina", &counts), &[]);

    assert_eq!(rows.len(), 14);
    assert!(!rows[11].has_full_history());
    assert!(rows[12].has_full_history());
    assert_eq!(rows[12].target_lags[0], Some(12.0));
    assert_eq!(rows[12].target_lags[11], Some(1.0));
    assert_eq!(rows[13].get("cases_lag3"), Some(11.0));
  }

  #[test]
  fn rolling_means_allow_partial_windows() {
    let rows = FeatureBuilder::default().build(&cases("Diamantina", &[2, 4, 6]), &[]);
    assert_eq!(rows[0].target_means, [Some(2.0), Some(2.0), Some(2.0)]);
    assert_eq!(rows[1].target_means, [Some(3.0), Some(3.0), Some(3.0)]);
    assert_eq!(rows[2].target_means, [Some(5.0), Some(4.0), Some(4.0)]);
  }

  #[test]
  fn weather_is_left_joined_and_gaps_stay_missing() {
    let case_rows = cases("Diamantina", &[1, 1, 1]);
    let weather = vec![
      WeeklyWeatherRow { temp: Some(20.0), ..WeeklyWeatherRow::empty("Diamantina", week(0)) },
      WeeklyWeatherRow { temp: Some(24.0), ..WeeklyWeatherRow::empty("Diamantina", week(2)) },
      WeeklyWeatherRow { temp: Some(99.0), ..WeeklyWeatherRow::empty("Elsewhere", week(1)) },
    ];
    let rows = FeatureBuilder::default().build(&case_rows, &weather);

    assert_eq!(rows[1].temp.value, None);
    assert_eq!(rows[1].temp.lags[0], Some(20.0));
    assert_eq!(rows[2].temp.means[0], Some(24.0));
    assert_eq!(rows[2].temp.means[1], Some(22.0));
    assert_eq!(rows[2].prec.means[1], None);
  }

  #[test]
  fn localities_do_not_leak_into_each_other() {
    let mut all = cases("Diamantina", &[1, 2]);
    all.extend(cases("Montes Claros", &[50, 60]));
    let rows = FeatureBuilder::default().build(&all, &[]);

    let montes: Vec<_> = rows.iter().filter(|r| r.locality == "Montes Claros").collect();
    assert_eq!(montes[0].target_lags[0], None);
    assert_eq!(montes[1].target_lags[0], Some(50.0));
  }

  #[test]
  fn seasonal_origin_global_or_per_locality() {
    let mut all = cases("Diamantina", &[1; 14]);
    let late: Vec<_> = cases("Montes Claros", &[1])
      .into_iter()
      .map(|mut r| {
        r.date = week(13);
        r
      })
      .collect();
    all.extend(late);

    let global = FeatureBuilder::new(SeasonalOrigin::Global).build(&all, &[]);
    let montes = global.iter().find(|r| r.locality == "Montes Claros").unwrap();
    assert_relative_eq!(montes.seasonal_sin, (TAU * 13.0 / 52.0).sin(), epsilon = 1e-12);
    assert_eq!(montes.month, 4);

    let local = FeatureBuilder::new(SeasonalOrigin::PerLocality).build(&all, &[]);
    let montes = local.iter().find(|r| r.locality == "Montes Claros").unwrap();
    assert_relative_eq!(montes.seasonal_sin, 0.0);
    assert_relative_eq!(montes.seasonal_cos, 1.0);
  }

  // ─── Rebuild ───────────────────────────────────────────────────────────────

  async fn stored(names: &[&str], weeks: usize) -> SqliteStore {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store.upsert_localities(names.iter().map(|n| Locality::new(*n)).collect()).await.unwrap();
    let mut rows = Vec::new();
    for name in names {
      rows.extend(cases(name, &vec![3; weeks]));
    }
    store.upsert_weekly_cases(rows).await.unwrap();
    store
  }

  #[tokio::test]
  async fn rebuild_resolves_requested_names() {
    let store = stored(&["Diamantina", "Teófilo Otoni"], 3).await;
    let only = Some(vec!["diamantina".to_string(), "TEOFILO_OTONI".to_string()]);
    let written =
      rebuild_features(&store, &FeatureBuilder::default(), only, ResolveMode::Lenient).await.unwrap();

    assert_eq!(written, 6);
    assert_eq!(store.features("Diamantina".into()).await.unwrap().len(), 3);
    assert_eq!(store.features("Teófilo Otoni".into()).await.unwrap().len(), 3);
  }

  #[tokio::test]
  async fn rebuild_of_one_locality_leaves_the_others() {
    let store = stored(&["Diamantina", "Montes Claros"], 2).await;
    rebuild_features(&store, &FeatureBuilder::default(), None, ResolveMode::Lenient).await.unwrap();
    let only = Some(vec!["montes claros".to_string()]);
    let written =
      rebuild_features(&store, &FeatureBuilder::default(), only, ResolveMode::Lenient).await.unwrap();

    assert_eq!(written, 2);
    assert_eq!(store.features("Diamantina".into()).await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn strict_rebuild_rejects_unknown_names() {
    let store = stored(&["Diamantina"], 2).await;
    let only = Some(vec!["Atlantis".to_string()]);
    let err = rebuild_features(&store, &FeatureBuilder::default(), only, ResolveMode::Strict)
      .await
      .unwrap_err();
    assert!(matches!(err, crate::Error::Core(arbo_core::Error::LocalityNotFound(_))));
  }
}
