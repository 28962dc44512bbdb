//! Column-role detection from header names.
//!
//! Headers are folded with [`slugify`] (accents stripped, lowercase, words
//! joined by `_`) and matched first against exact aliases, then against
//! keyword heuristics. A column is assigned to at most one role.

use arbo_core::locality::slugify;

/// What a source column carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  Locality,
  Date,
  Year,
  EpiWeek,
  Cases,
  Temp,
  Prec,
  Umid,
}

const ROLES: [Role; 8] = [
  Role::Locality,
  Role::Date,
  Role::Year,
  Role::EpiWeek,
  Role::Cases,
  Role::Temp,
  Role::Prec,
  Role::Umid,
];

impl Role {
  fn aliases(self) -> &'static [&'static str] {
    match self {
      Role::Locality => &["municipio", "cidade", "city", "locality", "nome_municipio"],
      Role::Date => &["date", "data", "dt_notific", "data_medicao"],
      Role::Year => &["ano", "ano_notificacao", "ano_epi", "year"],
      Role::EpiWeek => &["semana", "semana_epidemiologica", "se", "epi_week"],
      Role::Cases => &["casos", "cases", "total_cases", "notificacoes", "casos_notificados"],
      Role::Temp => &["temp", "temperatura", "tmed", "temp_media"],
      Role::Prec => &["prec", "chuva", "prcp", "precipitacao"],
      Role::Umid => &["umid", "umidade", "ur", "rh"],
    }
  }

  fn keyword_match(self, folded: &str) -> bool {
    let has = |keys: &[&str]| keys.iter().any(|k| folded.contains(k));
    let token = |keys: &[&str]| {
      folded
        .split(|c: char| !c.is_alphanumeric())
        .any(|t| keys.contains(&t))
    };
    match self {
      Role::Locality => has(&["municipio", "cidade", "city"]),
      Role::Date => has(&["data", "date"]),
      Role::Year | Role::EpiWeek => false,
      Role::Cases => has(&["casos", "cases", "notific"]),
      // Dew point is a temperature too, but not the air temperature.
      Role::Temp => has(&["temperatura", "tmed", "temp"]) && !has(&["orvalho", "dew"]),
      Role::Prec => has(&["precipitacao", "chuva", "prcp", "(mm)"]),
      Role::Umid => has(&["umidade", "umid", "%)"]) || token(&["ur", "rh"]),
    }
  }
}

/// Column index for every role found in a header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
  pub locality: Option<usize>,
  pub date:     Option<usize>,
  pub year:     Option<usize>,
  pub epi_week: Option<usize>,
  pub cases:    Option<usize>,
  pub temp:     Option<usize>,
  pub prec:     Option<usize>,
  pub umid:     Option<usize>,
}

impl ColumnMap {
  pub fn detect(headers: &[String]) -> Self {
    let folded: Vec<String> = headers.iter().map(|h| slugify(h)).collect();
    let mut taken = vec![false; headers.len()];
    let mut map = Self::default();

    for role in ROLES {
      let hit = folded
        .iter()
        .enumerate()
        .find(|(i, f)| !taken[*i] && role.aliases().contains(&f.as_str()))
        .map(|(i, _)| i);
      if let Some(i) = hit {
        taken[i] = true;
        *map.slot(role) = Some(i);
      }
    }

    for role in ROLES {
      if map.get(role).is_some() {
        continue;
      }
      let hit = folded
        .iter()
        .enumerate()
        .find(|(i, f)| !taken[*i] && role.keyword_match(f))
        .map(|(i, _)| i);
      if let Some(i) = hit {
        taken[i] = true;
        *map.slot(role) = Some(i);
      }
    }

    map
  }

  pub fn get(&self, role: Role) -> Option<usize> {
    match role {
      Role::Locality => self.locality,
      Role::Date => self.date,
      Role::Year => self.year,
      Role::EpiWeek => self.epi_week,
      Role::Cases => self.cases,
      Role::Temp => self.temp,
      Role::Prec => self.prec,
      Role::Umid => self.umid,
    }
  }

  fn slot(&mut self, role: Role) -> &mut Option<usize> {
    match role {
      Role::Locality => &mut self.locality,
      Role::Date => &mut self.date,
      Role::Year => &mut self.year,
      Role::EpiWeek => &mut self.epi_week,
      Role::Cases => &mut self.cases,
      Role::Temp => &mut self.temp,
      Role::Prec => &mut self.prec,
      Role::Umid => &mut self.umid,
    }
  }

  /// A date column, or a year plus epidemiological-week pair.
  pub fn has_date(&self) -> bool {
    self.date.is_some() || (self.year.is_some() && self.epi_week.is_some())
  }

  pub fn has_weather(&self) -> bool {
    self.temp.is_some() || self.prec.is_some() || self.umid.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn headers(names: &[&str]) -> Vec<String> { names.iter().map(|s| s.to_string()).collect() }

  #[test]
  fn direct_aliases() {
    let map = ColumnMap::detect(&headers(&["Município", "Data", "Casos"]));
    assert_eq!(map.locality, Some(0));
    assert_eq!(map.date, Some(1));
    assert_eq!(map.cases, Some(2));
    assert!(map.has_date());
    assert!(!map.has_weather());
  }

  #[test]
  fn station_headers_skip_dew_point() {
    let map = ColumnMap::detect(&headers(&[
      "Data",
      "Hora UTC",
      "PRECIPITAÇÃO TOTAL, HORÁRIO (mm)",
      "TEMPERATURA DO PONTO DE ORVALHO (°C)",
      "TEMPERATURA DO AR - BULBO SECO, HORARIA (°C)",
      "UMIDADE RELATIVA DO AR, HORARIA (%)",
    ]));
    assert_eq!(map.date, Some(0));
    assert_eq!(map.prec, Some(2));
    assert_eq!(map.temp, Some(4));
    assert_eq!(map.umid, Some(5));
  }

  #[test]
  fn ur_only_matches_as_a_word() {
    let map = ColumnMap::detect(&headers(&["date", "temperatura_media", "ur_media"]));
    assert_eq!(map.temp, Some(1));
    assert_eq!(map.umid, Some(2));

    let map = ColumnMap::detect(&headers(&["date", "hour"]));
    assert_eq!(map.umid, None);
  }

  #[test]
  fn epi_week_counts_as_date() {
    let map = ColumnMap::detect(&headers(&["ano", "semana", "casos"]));
    assert_eq!(map.date, None);
    assert_eq!(map.year, Some(0));
    assert_eq!(map.epi_week, Some(1));
    assert!(map.has_date());
  }

  #[test]
  fn no_date_column() {
    let map = ColumnMap::detect(&headers(&["city", "temp"]));
    assert!(!map.has_date());
  }
}
