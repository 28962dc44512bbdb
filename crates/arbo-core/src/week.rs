//! The weekly time axis.
//!
//! Every weekly row is labelled with an anchor date: the first occurrence of
//! the anchor weekday on or after the observation. A week therefore covers
//! the six days before its anchor plus the anchor itself, and re-bucketing an
//! anchored date returns it unchanged.

use std::{fmt, str::FromStr};

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The weekday that labels weekly buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WeekAnchor(Weekday);

impl Default for WeekAnchor {
  fn default() -> Self { Self(Weekday::Sun) }
}

impl WeekAnchor {
  pub const fn new(weekday: Weekday) -> Self { Self(weekday) }

  pub fn weekday(&self) -> Weekday { self.0 }

  /// The anchor date of the week containing `date`.
  pub fn bucket(&self, date: NaiveDate) -> NaiveDate {
    let target = self.0.num_days_from_monday();
    let current = date.weekday().num_days_from_monday();
    let ahead = (target + 7 - current) % 7;
    date + Days::new(u64::from(ahead))
  }

  pub fn is_anchored(&self, date: NaiveDate) -> bool { date.weekday() == self.0 }

  /// Fail with [`Error::UnanchoredDate`] unless `date` is an anchor date.
  pub fn check(&self, date: NaiveDate) -> Result<()> {
    if self.is_anchored(date) {
      Ok(())
    } else {
      Err(Error::UnanchoredDate { date, anchor: self.to_string() })
    }
  }

  /// The anchor of the week immediately after the week containing `date`.
  pub fn next(&self, date: NaiveDate) -> NaiveDate {
    self.bucket(date) + Days::new(7)
  }

  /// `count` consecutive anchor dates, starting the week after `last`.
  pub fn following(&self, last: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let first = self.next(last);
    (0..count as u64)
      .map(|k| first + Days::new(7 * k))
      .collect()
  }
}

impl fmt::Display for WeekAnchor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self.0 {
      Weekday::Mon => "monday",
      Weekday::Tue => "tuesday",
      Weekday::Wed => "wednesday",
      Weekday::Thu => "thursday",
      Weekday::Fri => "friday",
      Weekday::Sat => "saturday",
      Weekday::Sun => "sunday",
    };
    f.write_str(name)
  }
}

impl FromStr for WeekAnchor {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let weekday = match s.trim().to_lowercase().as_str() {
      "mon" | "monday" => Weekday::Mon,
      "tue" | "tuesday" => Weekday::Tue,
      "wed" | "wednesday" => Weekday::Wed,
      "thu" | "thursday" => Weekday::Thu,
      "fri" | "friday" => Weekday::Fri,
      "sat" | "saturday" => Weekday::Sat,
      "sun" | "sunday" => Weekday::Sun,
      _ => return Err(Error::UnknownWeekday(s.to_string())),
    };
    Ok(Self(weekday))
  }
}

impl TryFrom<String> for WeekAnchor {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { s.parse() }
}

impl From<WeekAnchor> for String {
  fn from(a: WeekAnchor) -> Self { a.to_string() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
  }

  #[test]
  fn bucket_moves_forward_to_sunday() {
    let anchor = WeekAnchor::default();
    // 2024-01-03 is a Wednesday; the following Sunday is the 7th.
    assert_eq!(anchor.bucket(d(2024, 1, 3)), d(2024, 1, 7));
    assert_eq!(anchor.bucket(d(2024, 1, 1)), d(2024, 1, 7));
  }

  #[test]
  fn bucket_of_anchor_is_identity() {
    let anchor = WeekAnchor::default();
    assert_eq!(anchor.bucket(d(2024, 1, 7)), d(2024, 1, 7));
    assert!(anchor.is_anchored(d(2024, 1, 7)));
    assert!(anchor.check(d(2024, 1, 8)).is_err());
  }

  #[test]
  fn other_anchor_weekday() {
    let anchor: WeekAnchor = "Monday".parse().unwrap();
    assert_eq!(anchor.bucket(d(2024, 1, 2)), d(2024, 1, 8));
    assert_eq!(anchor.bucket(d(2024, 1, 8)), d(2024, 1, 8));
  }

  #[test]
  fn following_is_weekly_and_starts_next_week() {
    let anchor = WeekAnchor::default();
    let dates = anchor.following(d(2024, 1, 7), 3);
    assert_eq!(dates, vec![d(2024, 1, 14), d(2024, 1, 21), d(2024, 1, 28)]);
  }

  #[test]
  fn serde_as_lowercase_name() {
    let anchor = WeekAnchor::new(Weekday::Sat);
    let json = serde_json::to_string(&anchor).unwrap();
    assert_eq!(json, "\"saturday\"");
    let back: WeekAnchor = serde_json::from_str("\"SUN\"").unwrap();
    assert_eq!(back, WeekAnchor::default());
  }
}
