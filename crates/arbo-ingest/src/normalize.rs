//! Source Normalizer: raw tables to canonical `{locality, date, values}` rows.

use std::path::{Path, PathBuf};

use arbo_core::locality::display_name;
use chrono::NaiveDate;

use crate::{
  Error, Result,
  columns::ColumnMap,
  parse::{parse_count, parse_dates, parse_epi_week, parse_number},
  table::RawTable,
};

// ─── Sources ─────────────────────────────────────────────────────────────────

/// What a source reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
  Cases,
  Weather,
}

/// One tabular input plus what the caller knows about it.
#[derive(Debug, Clone)]
pub struct Source {
  /// Identity used in logs and errors, usually the file name.
  pub origin:   String,
  pub kind:     SourceKind,
  pub table:    RawTable,
  /// Locality for rows without a locality cell (e.g. one file per city).
  pub locality: Option<String>,
}

impl Source {
  /// Read a file; its stem becomes the fallback locality.
  pub fn from_path(path: impl AsRef<Path>, kind: SourceKind) -> Result<Self> {
    let path = path.as_ref();
    let table = RawTable::from_path(path)?;
    Ok(Self {
      origin: path.display().to_string(),
      kind,
      table,
      locality: stem_locality(path),
    })
  }
}

fn stem_locality(path: &Path) -> Option<String> {
  let stem = path.file_stem()?.to_str()?.replace('-', " ");
  let name = display_name(&stem);
  (!name.is_empty()).then_some(name)
}

/// Every `.csv` file directly under `dir`, sorted by name.
pub fn discover(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
  let mut paths = Vec::new();
  for entry in std::fs::read_dir(dir)? {
    let path = entry?.path();
    let is_csv = path
      .extension()
      .and_then(|e| e.to_str())
      .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if path.is_file() && is_csv {
      paths.push(path);
    }
  }
  paths.sort();
  Ok(paths)
}

// ─── Normalized rows ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCaseRow {
  pub locality: String,
  pub date:     NaiveDate,
  pub cases:    i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedWeatherRow {
  pub locality: String,
  pub date:     NaiveDate,
  pub temp:     Option<f64>,
  pub prec:     Option<f64>,
  pub umid:     Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
  Cases(Vec<NormalizedCaseRow>),
  Weather(Vec<NormalizedWeatherRow>),
}

impl Normalized {
  pub fn len(&self) -> usize {
    match self {
      Normalized::Cases(rows) => rows.len(),
      Normalized::Weather(rows) => rows.len(),
    }
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

// ─── Normalizing ─────────────────────────────────────────────────────────────

/// Normalize a source according to its kind.
pub fn normalize(source: &Source) -> Result<Normalized> {
  match source.kind {
    SourceKind::Cases => normalize_cases(source).map(Normalized::Cases),
    SourceKind::Weather => normalize_weather(source).map(Normalized::Weather),
  }
}

/// Locate the date and locality of every row, dropping rows without either.
///
/// Returns `(row index, locality, date)` triples.
fn locate(source: &Source, map: &ColumnMap) -> Result<Vec<(usize, String, NaiveDate)>> {
  let table = &source.table;
  if map.locality.is_none() && source.locality.is_none() {
    return Err(Error::mismatch(
      &source.origin,
      "no locality column and no locality supplied",
    ));
  }

  let dates: Vec<Option<NaiveDate>> = match (map.date, map.year, map.epi_week) {
    (Some(c), _, _) => parse_dates((0..table.len()).map(|r| table.cell(r, c))),
    (None, Some(y), Some(w)) => (0..table.len())
      .map(|r| parse_epi_week(table.cell(r, y), table.cell(r, w)))
      .collect(),
    _ => return Err(Error::mismatch(&source.origin, "no date-like column")),
  };

  let mut located = Vec::with_capacity(table.len());
  let mut undated = 0usize;
  for (r, date) in dates.into_iter().enumerate() {
    let Some(date) = date else {
      undated += 1;
      continue;
    };
    let cell = map.locality.map(|c| display_name(table.cell(r, c)));
    let locality = match cell {
      Some(name) if !name.is_empty() => name,
      _ => match &source.locality {
        Some(name) => name.clone(),
        None => continue,
      },
    };
    located.push((r, locality, date));
  }
  if undated > 0 {
    tracing::debug!(origin = %source.origin, rows = undated, "dropped rows with unreadable dates");
  }
  Ok(located)
}

/// Case rows. An unreadable or negative count is a zero week.
pub fn normalize_cases(source: &Source) -> Result<Vec<NormalizedCaseRow>> {
  let map = ColumnMap::detect(&source.table.headers);
  let Some(col) = map.cases else {
    return Err(Error::mismatch(&source.origin, "no case-count column"));
  };
  let table = &source.table;
  let rows = locate(source, &map)?
    .into_iter()
    .map(|(r, locality, date)| NormalizedCaseRow {
      locality,
      date,
      cases: parse_count(table.cell(r, col), table.decimal_comma)
        .unwrap_or(0)
        .max(0),
    })
    .collect();
  Ok(rows)
}

/// Weather rows. Absent columns and unreadable cells stay `None`.
pub fn normalize_weather(source: &Source) -> Result<Vec<NormalizedWeatherRow>> {
  let map = ColumnMap::detect(&source.table.headers);
  if !map.has_weather() {
    return Err(Error::mismatch(&source.origin, "no temperature, precipitation or humidity column"));
  }
  let table = &source.table;
  let value = |r: usize, col: Option<usize>| {
    col.and_then(|c| parse_number(table.cell(r, c), table.decimal_comma))
  };
  let rows = locate(source, &map)?
    .into_iter()
    .map(|(r, locality, date)| NormalizedWeatherRow {
      locality,
      date,
      temp: value(r, map.temp),
      prec: value(r, map.prec),
      umid: value(r, map.umid),
    })
    .collect();
  Ok(rows)
}
