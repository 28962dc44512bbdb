//! Cell coercion: numbers, calendar dates and epidemiological weeks.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

/// Which of the two slash-style conventions to try for `a/b/y` dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
  MonthFirst,
  DayFirst,
}

impl DateOrder {
  fn other(self) -> Self {
    match self {
      DateOrder::MonthFirst => DateOrder::DayFirst,
      DateOrder::DayFirst => DateOrder::MonthFirst,
    }
  }

  fn formats(self) -> &'static [&'static str] {
    match self {
      DateOrder::MonthFirst => &["%m/%d/%Y", "%m-%d-%Y", "%m.%d.%Y", "%m/%d/%y"],
      DateOrder::DayFirst => &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y"],
    }
  }
}

const UNAMBIGUOUS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

const DATETIME: [&str; 4] = [
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%d %H:%M:%S",
  "%Y-%m-%d %H:%M",
  "%Y/%m/%d %H:%M",
];

// ─── Numbers ─────────────────────────────────────────────────────────────────

/// A finite float, or `None` for blank or unparsable text.
pub fn parse_number(raw: &str, decimal_comma: bool) -> Option<f64> {
  let s = raw.trim();
  if s.is_empty() {
    return None;
  }
  let value = if decimal_comma {
    s.replace(',', ".").parse::<f64>().ok()
  } else {
    s.parse::<f64>().ok()
  }?;
  value.is_finite().then_some(value)
}

/// A whole count; fractional input is truncated, anything else is `None`.
pub fn parse_count(raw: &str, decimal_comma: bool) -> Option<i64> {
  parse_number(raw, decimal_comma).map(|v| v.trunc() as i64)
}

// ─── Dates ───────────────────────────────────────────────────────────────────

/// Parse one cell with a given slash-style convention. Timestamps keep only
/// their calendar date.
pub fn parse_date(raw: &str, order: DateOrder) -> Option<NaiveDate> {
  let s = raw.trim();
  if s.is_empty() {
    return None;
  }
  for fmt in UNAMBIGUOUS {
    if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
      return Some(d);
    }
  }
  for fmt in DATETIME {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
      return Some(dt.date());
    }
  }
  if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
    return Some(dt.date_naive());
  }
  // `dd/mm/yyyy hh:mm` and friends: the date is the first word.
  let head = s.split_whitespace().next().unwrap_or(s);
  order
    .formats()
    .iter()
    .find_map(|fmt| NaiveDate::parse_from_str(head, fmt).ok())
}

/// Parse a whole column.
///
/// The primary convention is the one the unambiguous cells vote for
/// (month-first on a tie); it is applied to every cell, and only the cells it
/// fails on are retried with the other convention.
pub fn parse_dates<'a>(cells: impl IntoIterator<Item = &'a str>) -> Vec<Option<NaiveDate>> {
  let cells: Vec<&str> = cells.into_iter().collect();
  let primary = vote(&cells);
  cells
    .iter()
    .map(|c| parse_date(c, primary).or_else(|| parse_date(c, primary.other())))
    .collect()
}

fn vote(cells: &[&str]) -> DateOrder {
  let (mut month_only, mut day_only) = (0usize, 0usize);
  for c in cells {
    match (
      parse_date(c, DateOrder::MonthFirst).is_some(),
      parse_date(c, DateOrder::DayFirst).is_some(),
    ) {
      (true, false) => month_only += 1,
      (false, true) => day_only += 1,
      _ => {}
    }
  }
  if day_only > month_only { DateOrder::DayFirst } else { DateOrder::MonthFirst }
}

// ─── Epidemiological weeks ───────────────────────────────────────────────────

/// The Sunday that opens ISO week `week` of `year`.
pub fn epi_week_start(year: i32, week: u32) -> Option<NaiveDate> {
  let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
  let sunday = monday - Duration::days(1);
  debug_assert_eq!(sunday.weekday(), Weekday::Sun);
  Some(sunday)
}

/// The Saturday that closes epidemiological week `week` of `year`.
///
/// Epi-week rows are dated by their closing day so they bucket together with
/// daily observations from the same Sunday-to-Saturday span.
pub fn epi_week_end(year: i32, week: u32) -> Option<NaiveDate> {
  Some(epi_week_start(year, week)? + Duration::days(6))
}

/// Year and week cells of an epidemiological-week source, dated by the
/// week's closing Saturday.
pub fn parse_epi_week(year: &str, week: &str) -> Option<NaiveDate> {
  let year = parse_count(year, false)?;
  let week = parse_count(week, false)?;
  epi_week_end(i32::try_from(year).ok()?, u32::try_from(week).ok()?)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  #[test]
  fn numbers() {
    assert_eq!(parse_number("22,5", true), Some(22.5));
    assert_eq!(parse_number("22.5", false), Some(22.5));
    assert_eq!(parse_number(" 3 ", false), Some(3.0));
    assert_eq!(parse_number("", false), None);
    assert_eq!(parse_number("n/a", false), None);
    assert_eq!(parse_number("NaN", false), None);
    assert_eq!(parse_number("inf", false), None);
    assert_eq!(parse_count("4.9", false), Some(4));
  }

  #[test]
  fn iso_and_timestamps() {
    assert_eq!(parse_date("2024-01-07", DateOrder::DayFirst), Some(day(2024, 1, 7)));
    assert_eq!(parse_date("2024/01/07 13:00", DateOrder::DayFirst), Some(day(2024, 1, 7)));
    assert_eq!(parse_date("2024-01-07T23:59:00", DateOrder::MonthFirst), Some(day(2024, 1, 7)));
    assert_eq!(parse_date("2024-01-07T23:59:00Z", DateOrder::MonthFirst), Some(day(2024, 1, 7)));
    assert_eq!(parse_date("garbage", DateOrder::MonthFirst), None);
  }

  #[test]
  fn ambiguous_dates_follow_the_convention() {
    assert_eq!(parse_date("03/04/2024", DateOrder::MonthFirst), Some(day(2024, 3, 4)));
    assert_eq!(parse_date("03/04/2024", DateOrder::DayFirst), Some(day(2024, 4, 3)));
    assert_eq!(parse_date("25/04/2024 10:00", DateOrder::DayFirst), Some(day(2024, 4, 25)));
  }

  #[test]
  fn column_votes_for_day_first() {
    let parsed = parse_dates(["25/04/2024", "03/04/2024", "2024-05-01"]);
    assert_eq!(parsed, vec![Some(day(2024, 4, 25)), Some(day(2024, 4, 3)), Some(day(2024, 5, 1))]);
  }

  #[test]
  fn failures_retry_with_the_other_convention() {
    let parsed = parse_dates(["04/25/2024", "04/26/2024", "27/04/2024", "bad"]);
    assert_eq!(
      parsed,
      vec![Some(day(2024, 4, 25)), Some(day(2024, 4, 26)), Some(day(2024, 4, 27)), None]
    );
  }

  #[test]
  fn epi_weeks_start_on_sunday() {
    // ISO week 1 of 2024 starts Monday 2024-01-01.
    assert_eq!(epi_week_start(2024, 1), Some(day(2023, 12, 31)));
    assert_eq!(epi_week_start(2024, 10), Some(day(2024, 3, 3)));
    assert_eq!(parse_epi_week("2024", "10"), Some(day(2024, 3, 9)));
    assert_eq!(epi_week_start(2023, 53), None);
  }
}
