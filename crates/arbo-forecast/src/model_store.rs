//! Model Store: load-once access to the model bundle of a directory.

use std::{
  path::{Path, PathBuf},
  sync::{Arc, RwLock},
};

use tokio::sync::OnceCell;
use tracing::info;

use crate::{Result, model::ModelBundle};

type Slot = Arc<OnceCell<Arc<ModelBundle>>>;

/// Shares one [`ModelBundle`] between concurrent forecasts.
///
/// The first caller loads the bundle while later callers wait for the same
/// initialisation; nobody ever observes a partially loaded bundle. A failed
/// load is not cached. [`ModelStore::invalidate`] swaps in an empty slot, so
/// forecasts already holding the old bundle finish with it.
pub struct ModelStore {
  dir:  PathBuf,
  slot: RwLock<Slot>,
}

impl ModelStore {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into(), slot: RwLock::new(Arc::new(OnceCell::new())) }
  }

  /// A store already holding `bundle`; after invalidation it loads from `dir`.
  pub fn preloaded(dir: impl Into<PathBuf>, bundle: ModelBundle) -> Self {
    let cell = OnceCell::new_with(Some(Arc::new(bundle)));
    Self { dir: dir.into(), slot: RwLock::new(Arc::new(cell)) }
  }

  pub fn dir(&self) -> &Path { &self.dir }

  fn current(&self) -> Slot {
    self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
  }

  pub fn is_loaded(&self) -> bool { self.current().initialized() }

  pub async fn get_or_load(&self) -> Result<Arc<ModelBundle>> {
    let slot = self.current();
    let bundle = slot
      .get_or_try_init(|| async {
        let dir = self.dir.clone();
        let bundle = tokio::task::spawn_blocking(move || ModelBundle::load(&dir)).await??;
        info!(
          dir = %self.dir.display(),
          model = %bundle.metadata.model_name,
          lookback = bundle.metadata.lookback,
          "loaded model bundle"
        );
        Ok::<_, crate::Error>(Arc::new(bundle))
      })
      .await?;
    Ok(Arc::clone(bundle))
  }

  /// Drop the cached bundle; the next call reloads from disk.
  pub fn invalidate(&self) {
    *self.slot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(OnceCell::new());
    info!(dir = %self.dir.display(), "model bundle invalidated");
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;
  use crate::{
    Error,
    model::{METADATA_FILE, MODEL_FILE},
  };

  const MODEL: &str = r#"{
    "lstm": [{"w_input": [[0.1],[0.1],[0.1],[0.1]], "w_recurrent": [[0.0],[0.0],[0.0],[0.0]], "bias": [0,0,0,0]}],
    "dense": [{"weights": [[1.0]], "bias": [0.0]}],
    "dropout": 0.2
  }"#;

  fn write_model(dir: &Path, name: &str) {
    fs::write(
      dir.join(METADATA_FILE),
      format!(r#"{{"model_name": "{name}", "lookback": 2, "feature_order": ["cases"]}}"#),
    )
    .unwrap();
    fs::write(dir.join(MODEL_FILE), MODEL).unwrap();
  }

  #[tokio::test]
  async fn loads_once_and_shares() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path(), "first");
    let store = ModelStore::new(dir.path());

    let a = store.get_or_load().await.unwrap();
    let b = store.get_or_load().await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.metadata.model_name, "first");
  }

  #[tokio::test]
  async fn concurrent_callers_get_the_same_bundle() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path(), "shared");
    let store = Arc::new(ModelStore::new(dir.path()));

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.get_or_load().await.unwrap() })
      })
      .collect();
    let mut bundles = Vec::new();
    for h in handles {
      bundles.push(h.await.unwrap());
    }
    assert!(bundles.iter().all(|b| Arc::ptr_eq(b, &bundles[0])));
  }

  #[tokio::test]
  async fn missing_model_is_retried_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path());

    assert!(matches!(store.get_or_load().await, Err(Error::ModelUnavailable(_))));
    assert!(!store.is_loaded());

    write_model(dir.path(), "late");
    assert_eq!(store.get_or_load().await.unwrap().metadata.model_name, "late");
  }

  #[tokio::test]
  async fn invalidate_reloads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_model(dir.path(), "v1");
    let store = ModelStore::new(dir.path());
    let old = store.get_or_load().await.unwrap();

    write_model(dir.path(), "v2");
    assert_eq!(store.get_or_load().await.unwrap().metadata.model_name, "v1");

    store.invalidate();
    assert!(!store.is_loaded());
    let new = store.get_or_load().await.unwrap();
    assert_eq!(new.metadata.model_name, "v2");
    assert_eq!(old.metadata.model_name, "v1");
  }
}
