//! Naive Forecast tier, used when no trained model is available.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaiveMethod {
  /// Repeat the last observed week.
  LastValue,
  /// Repeat the mean of the last four observed weeks (fewer when the series
  /// is shorter).
  #[default]
  MeanOfLast4,
}

impl NaiveMethod {
  /// Identifier recorded as the model name of naive runs.
  pub fn model_name(self) -> &'static str {
    match self {
      NaiveMethod::LastValue => "naive_last_value",
      NaiveMethod::MeanOfLast4 => "naive_mean_4",
    }
  }

  /// `horizon` copies of the level, rounded to whole cases and clamped at
  /// zero. `None` only for an empty history.
  pub fn forecast(self, history: &[f64], horizon: usize) -> Option<Vec<f64>> {
    let last = *history.last()?;
    let level = match self {
      NaiveMethod::LastValue => last,
      NaiveMethod::MeanOfLast4 => {
        let tail = &history[history.len().saturating_sub(4)..];
        tail.iter().sum::<f64>() / tail.len() as f64
      }
    };
    let level = if level.is_finite() { level.round().max(0.0) } else { 0.0 };
    Some(vec![level; horizon])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mean_of_last_four() {
    let history = [100.0, 1.0, 2.0, 3.0, 5.0];
    assert_eq!(NaiveMethod::MeanOfLast4.forecast(&history, 3), Some(vec![3.0; 3]));
  }

  #[test]
  fn short_history_uses_what_exists() {
    assert_eq!(NaiveMethod::MeanOfLast4.forecast(&[1.0, 2.0], 2), Some(vec![2.0; 2]));
    assert_eq!(NaiveMethod::LastValue.forecast(&[4.0, 7.0], 1), Some(vec![7.0]));
  }

  #[test]
  fn empty_history_has_no_forecast() {
    assert_eq!(NaiveMethod::LastValue.forecast(&[], 4), None);
  }
}
