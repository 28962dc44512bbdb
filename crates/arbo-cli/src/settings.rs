//! Layered configuration: defaults, then an optional TOML file, then `ARBO_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use arbo_core::{locality::ResolveMode, week::WeekAnchor};
use arbo_forecast::{EngineConfig, NaiveMethod, SeasonalOrigin};
use arbo_ingest::IngestOptions;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path:      PathBuf,
  pub model_dir:       PathBuf,
  pub week_anchor:     WeekAnchor,
  pub resolve_mode:    ResolveMode,
  pub seasonal_origin: SeasonalOrigin,
  pub mc_samples:      Option<usize>,
  pub seed:            Option<u64>,
  pub naive_method:    NaiveMethod,
  pub record_runs:     bool,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path:      "arbo.db".into(),
      model_dir:       "models".into(),
      week_anchor:     WeekAnchor::default(),
      resolve_mode:    ResolveMode::default(),
      seasonal_origin: SeasonalOrigin::default(),
      mc_samples:      None,
      seed:            None,
      naive_method:    NaiveMethod::default(),
      record_runs:     true,
    }
  }
}

impl Settings {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let layered = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ARBO").try_parsing(true))
      .build()
      .context("failed to read configuration")?;
    Self::from_config(layered)
  }

  fn from_config(layered: config::Config) -> anyhow::Result<Self> {
    let mut settings: Settings =
      layered.try_deserialize().context("failed to deserialise settings")?;
    settings.store_path = expand_tilde(&settings.store_path);
    settings.model_dir = expand_tilde(&settings.model_dir);
    Ok(settings)
  }

  pub fn ingest_options(&self) -> IngestOptions {
    IngestOptions { anchor: self.week_anchor, resolve_mode: self.resolve_mode }
  }

  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      anchor: self.week_anchor,
      resolve_mode: self.resolve_mode,
      seasonal_origin: self.seasonal_origin,
      mc_samples: self.mc_samples,
      seed: self.seed,
      naive_method: self.naive_method,
      record_runs: self.record_runs,
      ..EngineConfig::default()
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn from_toml(toml: &str) -> Settings {
    let layered = config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap();
    Settings::from_config(layered).unwrap()
  }

  #[test]
  fn empty_file_gives_defaults() {
    assert_eq!(from_toml(""), Settings::default());
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let dir = std::env::temp_dir().join("arbo-settings-test-does-not-exist.toml");
    let settings = Settings::load(&dir).unwrap();
    assert_eq!(settings.model_dir, PathBuf::from("models"));
  }

  #[test]
  fn file_values_override_defaults() {
    let settings = from_toml(
      r#"
        store_path = "/var/lib/arbo/arbo.db"
        week_anchor = "monday"
        resolve_mode = "strict"
        seasonal_origin = "per_locality"
        naive_method = "last_value"
        mc_samples = 200
        seed = 42
        record_runs = false
      "#,
    );
    assert_eq!(settings.store_path, PathBuf::from("/var/lib/arbo/arbo.db"));
    assert_eq!(settings.week_anchor, "monday".parse::<WeekAnchor>().unwrap());
    assert_eq!(settings.resolve_mode, ResolveMode::Strict);

    let engine = settings.engine_config();
    assert_eq!(engine.seasonal_origin, SeasonalOrigin::PerLocality);
    assert_eq!(engine.naive_method, NaiveMethod::LastValue);
    assert_eq!(engine.mc_samples, Some(200));
    assert_eq!(engine.seed, Some(42));
    assert!(!engine.record_runs);
    assert_eq!(engine.lower_quantile, 0.1);
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/arbo.db")), PathBuf::from(home).join("arbo.db"));
    assert_eq!(expand_tilde(Path::new("/abs/arbo.db")), PathBuf::from("/abs/arbo.db"));
  }
}
