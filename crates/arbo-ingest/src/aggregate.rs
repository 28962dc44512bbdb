//! Weekly Aggregator: bucket observations onto the anchor weekday and reduce.
//!
//! Counts (cases, precipitation) are summed and intensities (temperature,
//! humidity) averaged over the observed values of each `(locality, week)`.
//! A bucket with a single observation still yields a value. A column with no
//! observed value in a bucket stays `None` rather than summing to zero, so it
//! never overwrites a stored value on upsert.

use std::collections::BTreeMap;

use arbo_core::{
  week::WeekAnchor,
  weekly::{WeeklyCaseRow, WeeklyWeatherRow},
};
use chrono::NaiveDate;

use crate::normalize::{NormalizedCaseRow, NormalizedWeatherRow};

/// How a column collapses within one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
  Sum,
  Mean,
}

#[derive(Debug, Clone, Copy, Default)]
struct Acc {
  sum:   f64,
  count: usize,
}

impl Acc {
  fn push(&mut self, value: Option<f64>) {
    if let Some(v) = value {
      self.sum += v;
      self.count += 1;
    }
  }

  fn finish(self, reduce: Reduce) -> Option<f64> {
    if self.count == 0 {
      return None;
    }
    Some(match reduce {
      Reduce::Sum => self.sum,
      Reduce::Mean => self.sum / self.count as f64,
    })
  }
}

/// Group `(locality, date, values)` observations by `(locality, week)` and
/// reduce each value column with the matching entry of `reducers`.
///
/// Output is ordered by locality then week. Observations already on the
/// anchor with one row per week come back unchanged.
pub fn weekify<I>(
  observations: I,
  reducers: &[Reduce],
  anchor: WeekAnchor,
) -> Vec<(String, NaiveDate, Vec<Option<f64>>)>
where
  I: IntoIterator<Item = (String, NaiveDate, Vec<Option<f64>>)>,
{
  let mut buckets: BTreeMap<(String, NaiveDate), Vec<Acc>> = BTreeMap::new();
  for (locality, date, values) in observations {
    let accs = buckets
      .entry((locality, anchor.bucket(date)))
      .or_insert_with(|| vec![Acc::default(); reducers.len()]);
    for (acc, value) in accs.iter_mut().zip(values) {
      acc.push(value);
    }
  }
  buckets
    .into_iter()
    .map(|((locality, week), accs)| {
      let values = accs.into_iter().zip(reducers).map(|(a, r)| a.finish(*r)).collect();
      (locality, week, values)
    })
    .collect()
}

/// Weekly case totals.
pub fn weekly_cases(rows: Vec<NormalizedCaseRow>, anchor: WeekAnchor) -> Vec<WeeklyCaseRow> {
  let observations = rows
    .into_iter()
    .map(|r| (r.locality, r.date, vec![Some(r.cases as f64)]));
  weekify(observations, &[Reduce::Sum], anchor)
    .into_iter()
    .map(|(locality, date, values)| {
      let cases = values[0].unwrap_or_default().round() as i64;
      WeeklyCaseRow::new(locality, date, cases)
    })
    .collect()
}

/// Weekly weather: mean temperature, total precipitation, mean humidity.
pub fn weekly_weather(rows: Vec<NormalizedWeatherRow>, anchor: WeekAnchor) -> Vec<WeeklyWeatherRow> {
  let observations = rows
    .into_iter()
    .map(|r| (r.locality, r.date, vec![r.temp, r.prec, r.umid]));
  weekify(observations, &[Reduce::Mean, Reduce::Sum, Reduce::Mean], anchor)
    .into_iter()
    .map(|(locality, date, values)| WeeklyWeatherRow {
      locality,
      date,
      temp: values[0],
      prec: values[1],
      umid: values[2],
    })
    .collect()
}
