//! [`SqliteStore`], the SQLite implementation of [`WeeklyStore`].

use std::path::Path;

use arbo_core::{
  feature::{FeatureRow, stored_columns},
  forecast::ForecastRun,
  locality::Locality,
  store::WeeklyStore,
  weekly::{WeeklyCaseRow, WeeklyWeatherRow},
};

use crate::{
  Error, Result,
  encode::{
    RawCaseRow, RawFeatureRow, RawForecastRun, RawWeatherRow, encode_date,
    encode_feature_row,
  },
  schema::SCHEMA,
};

// ─── Statements ──────────────────────────────────────────────────────────────

const UPSERT_LOCALITY: &str = "
  INSERT INTO localities (slug, name, external_code, lat, lon)
  VALUES (?1, ?2, ?3, ?4, ?5)
  ON CONFLICT (slug) DO UPDATE SET
    external_code = COALESCE(localities.external_code, excluded.external_code),
    lat           = COALESCE(localities.lat, excluded.lat),
    lon           = COALESCE(localities.lon, excluded.lon)";

const UPSERT_CASES: &str = "
  INSERT INTO weekly_cases (locality, date, cases, total_cases)
  VALUES (?1, ?2, ?3, ?4)
  ON CONFLICT (locality, date) DO UPDATE SET
    cases       = excluded.cases,
    total_cases = COALESCE(excluded.total_cases, weekly_cases.total_cases)";

const UPSERT_WEATHER: &str = "
  INSERT INTO weather_weekly (locality, date, temp, prec, umid)
  VALUES (?1, ?2, ?3, ?4, ?5)
  ON CONFLICT (locality, date) DO UPDATE SET
    temp = COALESCE(excluded.temp, weather_weekly.temp),
    prec = COALESCE(excluded.prec, weather_weekly.prec),
    umid = COALESCE(excluded.umid, weather_weekly.umid)";

const INSERT_FORECAST: &str = "
  INSERT INTO forecasts
    (locality, run_at, model_name, horizon, start_date,
     yhat, lower, upper, scaling, confidence, metadata)
  VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A weekly store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Column names of `table` in declaration order.
  #[cfg(test)]
  pub(crate) async fn table_columns(&self, table: &'static str) -> Result<Vec<String>> {
    let cols = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let cols = stmt
          .query_map([], |row| row.get::<_, String>(1))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cols)
      })
      .await?;
    Ok(cols)
  }
}

fn features_insert_sql() -> String {
  let cols = stored_columns();
  let placeholders = (1..=cols.len() + 3)
    .map(|i| format!("?{i}"))
    .collect::<Vec<_>>()
    .join(", ");
  format!(
    "INSERT INTO features_weekly (locality, date, target, {}) VALUES ({placeholders})",
    cols.join(", ")
  )
}

fn features_select_sql() -> String {
  format!(
    "SELECT locality, date, target, {} FROM features_weekly WHERE locality = ?1 ORDER BY date",
    stored_columns().join(", ")
  )
}

// ─── WeeklyStore impl ────────────────────────────────────────────────────────

impl WeeklyStore for SqliteStore {
  type Error = Error;

  // ── Localities ────────────────────────────────────────────────────────

  async fn upsert_localities(&self, localities: Vec<Locality>) -> Result<usize> {
    if localities.is_empty() {
      return Ok(0);
    }
    let n = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(UPSERT_LOCALITY)?;
          for l in &localities {
            stmt.execute(rusqlite::params![l.slug, l.name, l.external_code, l.lat, l.lon])?;
          }
        }
        tx.commit()?;
        Ok(localities.len())
      })
      .await?;
    tracing::debug!(rows = n, "upserted localities");
    Ok(n)
  }

  async fn list_localities(&self) -> Result<Vec<Locality>> {
    let rows = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT name, slug, external_code, lat, lon FROM localities ORDER BY slug",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(Locality {
              name:          row.get(0)?,
              slug:          row.get(1)?,
              external_code: row.get(2)?,
              lat:           row.get(3)?,
              lon:           row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  // ── Weekly upserts ────────────────────────────────────────────────────

  async fn upsert_weekly_cases(&self, rows: Vec<WeeklyCaseRow>) -> Result<usize> {
    if rows.is_empty() {
      return Ok(0);
    }
    let n = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(UPSERT_CASES)?;
          for r in &rows {
            stmt.execute(rusqlite::params![
              r.locality,
              encode_date(r.date),
              r.cases,
              r.total_cases
            ])?;
          }
        }
        tx.commit()?;
        Ok(rows.len())
      })
      .await?;
    tracing::debug!(rows = n, "upserted weekly cases");
    Ok(n)
  }

  async fn upsert_weekly_weather(&self, rows: Vec<WeeklyWeatherRow>) -> Result<usize> {
    if rows.is_empty() {
      return Ok(0);
    }
    let n = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(UPSERT_WEATHER)?;
          for r in &rows {
            stmt.execute(rusqlite::params![
              r.locality,
              encode_date(r.date),
              r.temp,
              r.prec,
              r.umid
            ])?;
          }
        }
        tx.commit()?;
        Ok(rows.len())
      })
      .await?;
    tracing::debug!(rows = n, "upserted weekly weather");
    Ok(n)
  }

  // ── Weekly reads ──────────────────────────────────────────────────────

  async fn weekly_cases(&self, locality: Option<String>) -> Result<Vec<WeeklyCaseRow>> {
    let raws: Vec<RawCaseRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT locality, date, cases, total_cases FROM weekly_cases
           WHERE ?1 IS NULL OR locality = ?1
           ORDER BY locality, date",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![locality], |row| {
            Ok(RawCaseRow {
              locality:    row.get(0)?,
              date:        row.get(1)?,
              cases:       row.get(2)?,
              total_cases: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCaseRow::into_row).collect()
  }

  async fn weekly_weather(&self, locality: Option<String>) -> Result<Vec<WeeklyWeatherRow>> {
    let raws: Vec<RawWeatherRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT locality, date, temp, prec, umid FROM weather_weekly
           WHERE ?1 IS NULL OR locality = ?1
           ORDER BY locality, date",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![locality], |row| {
            Ok(RawWeatherRow {
              locality: row.get(0)?,
              date:     row.get(1)?,
              temp:     row.get(2)?,
              prec:     row.get(3)?,
              umid:     row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawWeatherRow::into_row).collect()
  }

  // ── Features ──────────────────────────────────────────────────────────

  async fn replace_features(
    &self,
    localities: Vec<String>,
    rows: Vec<FeatureRow>,
  ) -> Result<usize> {
    let encoded: Vec<_> = rows.iter().map(encode_feature_row).collect();
    let insert = features_insert_sql();
    let n = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut delete = tx.prepare("DELETE FROM features_weekly WHERE locality = ?1")?;
          for l in &localities {
            delete.execute(rusqlite::params![l])?;
          }
          let mut stmt = tx.prepare(&insert)?;
          for values in &encoded {
            stmt.execute(rusqlite::params_from_iter(values.iter()))?;
          }
        }
        tx.commit()?;
        Ok(encoded.len())
      })
      .await?;
    tracing::debug!(rows = n, "replaced feature rows");
    Ok(n)
  }

  async fn features(&self, locality: String) -> Result<Vec<FeatureRow>> {
    let select = features_select_sql();
    let width = stored_columns().len();
    let raws: Vec<RawFeatureRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&select)?;
        let rows = stmt
          .query_map(rusqlite::params![locality], |row| {
            let values = (0..width)
              .map(|i| row.get::<_, Option<f64>>(3 + i))
              .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(RawFeatureRow {
              locality: row.get(0)?,
              date: row.get(1)?,
              target: row.get(2)?,
              values,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFeatureRow::into_row).collect()
  }

  // ── Forecast audit trail ──────────────────────────────────────────────

  async fn record_forecast(&self, run: ForecastRun) -> Result<()> {
    let raw = RawForecastRun::encode(&run)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          INSERT_FORECAST,
          rusqlite::params![
            raw.locality,
            raw.run_at,
            raw.model_name,
            raw.horizon,
            raw.start_date,
            raw.yhat,
            raw.lower,
            raw.upper,
            raw.scaling,
            raw.confidence,
            raw.metadata,
          ],
        )?;
        Ok(())
      })
      .await?;
    tracing::debug!(locality = %run.locality, model = %run.model_name, "recorded forecast run");
    Ok(())
  }

  async fn forecasts(&self, locality: String) -> Result<Vec<ForecastRun>> {
    let raws: Vec<RawForecastRun> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT locality, run_at, model_name, horizon, start_date,
                  yhat, lower, upper, scaling, confidence, metadata
           FROM forecasts WHERE locality = ?1
           ORDER BY run_at DESC, model_name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![locality], |row| {
            Ok(RawForecastRun {
              locality:   row.get(0)?,
              run_at:     row.get(1)?,
              model_name: row.get(2)?,
              horizon:    row.get(3)?,
              start_date: row.get(4)?,
              yhat:       row.get(5)?,
              lower:      row.get(6)?,
              upper:      row.get(7)?,
              scaling:    row.get(8)?,
              confidence: row.get(9)?,
              metadata:   row.get(10)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawForecastRun::into_run).collect()
  }
}
