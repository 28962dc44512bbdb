//! `arbo`: ingest weekly arbovirus data and forecast it.
//!
//! # Usage
//!
//! ```text
//! arbo ingest --cases data/casos.csv --weather data/clima/
//! arbo features
//! arbo forecast "Teófilo Otoni" --horizon 4
//! arbo --config /etc/arbo.toml runs teofilo_otoni
//! ```

mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use arbo_core::{locality::ResolveMode, store::WeeklyStore};
use arbo_forecast::{FeatureBuilder, ForecastEngine, ModelStore, rebuild_features};
use arbo_ingest::{Source, SourceKind, discover, ingest};
use arbo_store_sqlite::SqliteStore;
use clap::{Parser, Subcommand};
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "arbo", version, about = "Weekly arbovirus ingestion and forecasting")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "arbo.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Normalise, aggregate and upsert case and weather sources.
  Ingest {
    /// Case CSV files or directories of them.
    #[arg(long, value_name = "PATH")]
    cases:   Vec<PathBuf>,
    /// Weather CSV files or directories of them.
    #[arg(long, value_name = "PATH")]
    weather: Vec<PathBuf>,
    /// Fail on localities that are not registered yet.
    #[arg(long)]
    strict:  bool,
  },

  /// Rebuild the feature table.
  Features {
    /// Only rebuild these localities.
    #[arg(long = "locality", value_name = "NAME")]
    localities: Vec<String>,
  },

  /// Forecast one locality and print the result as JSON.
  Forecast {
    locality: String,
    #[arg(long, default_value_t = 4)]
    horizon:  usize,
  },

  /// Print the recorded forecast runs of a locality as JSON.
  Runs { locality: String },

  /// List registered localities.
  Localities,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  let store = SqliteStore::open(&settings.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", settings.store_path))?;

  match cli.command {
    Command::Ingest { cases, weather, strict } => {
      let mut sources = open_sources(&cases, SourceKind::Cases)?;
      sources.extend(open_sources(&weather, SourceKind::Weather)?);
      if sources.is_empty() {
        anyhow::bail!("nothing to ingest: pass --cases and/or --weather");
      }

      let mut options = settings.ingest_options();
      if strict {
        options.resolve_mode = ResolveMode::Strict;
      }
      let report = ingest(&store, &sources, options).await.context("ingestion failed")?;
      for skipped in &report.skipped {
        println!("skipped {}: {}", skipped.origin, skipped.reason);
      }
      println!(
        "{} sources, {} new localities, {} case weeks, {} weather weeks",
        report.sources_read, report.new_localities, report.case_rows, report.weather_rows
      );
    }

    Command::Features { localities } => {
      let builder = FeatureBuilder::new(settings.seasonal_origin);
      let only = (!localities.is_empty()).then_some(localities);
      let rows = rebuild_features(&store, &builder, only, settings.resolve_mode)
        .await
        .context("feature rebuild failed")?;
      println!("{rows} feature rows");
    }

    Command::Forecast { locality, horizon } => {
      let engine = engine(store, &settings);
      let forecast = engine
        .forecast(&locality, horizon)
        .await
        .with_context(|| format!("forecast for {locality:?} failed"))?;
      println!("{}", serde_json::to_string_pretty(&forecast)?);
    }

    Command::Runs { locality } => {
      let engine = engine(store, &settings);
      let runs = engine.runs(&locality).await?;
      println!("{}", serde_json::to_string_pretty(&runs)?);
    }

    Command::Localities => {
      for locality in store.list_localities().await? {
        println!("{}\t{}", locality.slug, locality.name);
      }
    }
  }

  Ok(())
}

fn engine(store: SqliteStore, settings: &Settings) -> ForecastEngine<SqliteStore> {
  let models = Arc::new(ModelStore::new(settings.model_dir.clone()));
  ForecastEngine::new(store, models, settings.engine_config())
}

/// Open every path, expanding directories to the CSV files they hold.
fn open_sources(paths: &[PathBuf], kind: SourceKind) -> anyhow::Result<Vec<Source>> {
  let mut out = Vec::new();
  for path in paths {
    for file in expand(path)? {
      let source = Source::from_path(&file, kind)
        .with_context(|| format!("failed to read {}", file.display()))?;
      out.push(source);
    }
  }
  Ok(out)
}

fn expand(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
  if path.is_dir() {
    discover(path).with_context(|| format!("failed to list {}", path.display()))
  } else {
    Ok(vec![path.to_path_buf()])
  }
}
