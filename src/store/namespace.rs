//! Named, versioned cache namespaces.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::response::Response;

use super::backend::{CachedResponse, StoreBackend};

/// Resource classes, one persistent store per kind per version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
  Shell,
  Images,
  Documents,
  Fonts,
  Api,
  Misc,
}

impl StoreKind {
  pub const ALL: [StoreKind; 6] = [
    StoreKind::Shell,
    StoreKind::Images,
    StoreKind::Documents,
    StoreKind::Fonts,
    StoreKind::Api,
    StoreKind::Misc,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      StoreKind::Shell => "shell",
      StoreKind::Images => "images",
      StoreKind::Documents => "documents",
      StoreKind::Fonts => "fonts",
      StoreKind::Api => "api",
      StoreKind::Misc => "misc",
    }
  }
}

const INSTALLED_VERSION_KEY: &str = "installed_version";

/// Sole owner of the persistent stores.
///
/// Knows the physical store names (`"<kind>-<version>"`); nothing else
/// in the system does. Read/write errors on the strategy path are
/// swallowed and logged, never surfaced: a broken cache must not block
/// a response.
pub struct NamespaceManager<B> {
  backend: Arc<B>,
  version: String,
}

impl<B: StoreBackend> NamespaceManager<B> {
  pub fn new(backend: B, version: impl Into<String>) -> Self {
    Self {
      backend: Arc::new(backend),
      version: version.into(),
    }
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  /// A manager over the same backend at a different version token.
  #[allow(dead_code)]
  pub fn with_version(&self, version: impl Into<String>) -> Self {
    Self {
      backend: Arc::clone(&self.backend),
      version: version.into(),
    }
  }

  /// Open (creating if absent) the store for `kind` at the current
  /// version. Idempotent, no error path: creation failures are logged
  /// and the handle still works for whatever the backend can do.
  pub fn open(&self, kind: StoreKind) -> Store<B> {
    let name = format!("{}-{}", kind.as_str(), self.version);
    if let Err(e) = self.backend.ensure_store(&name) {
      warn!(store = %name, "failed to create store: {}", e);
    }
    Store {
      name,
      kind,
      backend: Arc::clone(&self.backend),
    }
  }

  /// Store names of every kind at the current version.
  pub fn keep_list(&self) -> Vec<String> {
    StoreKind::ALL
      .iter()
      .map(|kind| format!("{}-{}", kind.as_str(), self.version))
      .collect()
  }

  /// Delete every store whose name is not in `keep`. Idempotent; used
  /// once per activation.
  pub fn sweep_stale(&self, keep: &[String]) -> Result<()> {
    for name in self.backend.list_stores()? {
      if !keep.contains(&name) {
        info!(store = %name, "sweeping stale store");
        self.backend.delete_store(&name)?;
      }
    }
    Ok(())
  }

  /// Delete every store of every version. The hard reset behind the
  /// CLEAR_CACHES control command.
  pub fn purge_all(&self) -> Result<()> {
    for name in self.backend.list_stores()? {
      info!(store = %name, "purging store");
      self.backend.delete_store(&name)?;
    }
    Ok(())
  }

  /// `(store name, entry count)` for every existing store.
  pub fn store_counts(&self) -> Result<Vec<(String, usize)>> {
    let mut counts = Vec::new();
    for name in self.backend.list_stores()? {
      counts.push((name.clone(), self.backend.len(&name)?));
    }
    Ok(counts)
  }

  /// The version token whose install completed, if any.
  pub fn installed_version(&self) -> Option<String> {
    match self.backend.get_meta(INSTALLED_VERSION_KEY) {
      Ok(v) => v,
      Err(e) => {
        warn!("failed to read installed version: {}", e);
        None
      }
    }
  }

  pub fn mark_installed(&self) -> Result<()> {
    self.backend.set_meta(INSTALLED_VERSION_KEY, &self.version)
  }
}

impl<B> Clone for NamespaceManager<B> {
  fn clone(&self) -> Self {
    Self {
      backend: Arc::clone(&self.backend),
      version: self.version.clone(),
    }
  }
}

/// Handle to one namespace. Get/put swallow storage errors by design.
pub struct Store<B> {
  name: String,
  kind: StoreKind,
  backend: Arc<B>,
}

impl<B: StoreBackend> Store<B> {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn kind(&self) -> StoreKind {
    self.kind
  }

  pub fn get(&self, key: &str) -> Option<CachedResponse> {
    match self.backend.get(&self.name, key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(store = %self.name, "cache read failed: {}", e);
        None
      }
    }
  }

  /// Write an entry. Returns whether the write succeeded; failures are
  /// logged and otherwise ignored.
  pub fn put(&self, key: &str, url: &str, response: &Response) -> bool {
    match self.backend.put(&self.name, key, url, response) {
      Ok(()) => true,
      Err(e) => {
        warn!(store = %self.name, "cache write failed: {}", e);
        false
      }
    }
  }

  pub fn len(&self) -> usize {
    match self.backend.len(&self.name) {
      Ok(len) => len,
      Err(e) => {
        warn!(store = %self.name, "cache count failed: {}", e);
        0
      }
    }
  }

  pub fn evict_oldest(&self, count: usize) -> usize {
    match self.backend.evict_oldest(&self.name, count) {
      Ok(removed) => removed,
      Err(e) => {
        warn!(store = %self.name, "eviction failed: {}", e);
        0
      }
    }
  }
}

impl<B> Clone for Store<B> {
  fn clone(&self) -> Self {
    Self {
      name: self.name.clone(),
      kind: self.kind,
      backend: Arc::clone(&self.backend),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryBackend;

  fn manager(version: &str) -> NamespaceManager<MemoryBackend> {
    NamespaceManager::new(MemoryBackend::new(), version)
  }

  fn response() -> Response {
    Response::new(200, None, b"x".to_vec())
  }

  #[test]
  fn test_store_name_encodes_kind_and_version() {
    let namespaces = manager("v2");
    let store = namespaces.open(StoreKind::Images);
    assert_eq!(store.name(), "images-v2");
  }

  #[test]
  fn test_open_is_idempotent() {
    let namespaces = manager("v1");
    let a = namespaces.open(StoreKind::Api);
    a.put("k", "u", &response());
    let b = namespaces.open(StoreKind::Api);
    assert!(b.get("k").is_some());
    assert_eq!(namespaces.store_counts().unwrap().len(), 1);
  }

  #[test]
  fn test_sweep_stale_removes_only_other_versions() {
    let old = manager("v1");
    old.open(StoreKind::Shell).put("k", "u", &response());
    old.open(StoreKind::Images).put("k", "u", &response());

    let new = old.with_version("v2");
    new.open(StoreKind::Shell).put("k", "u", &response());

    new.sweep_stale(&new.keep_list()).unwrap();

    let names: Vec<String> = new
      .store_counts()
      .unwrap()
      .into_iter()
      .map(|(name, _)| name)
      .collect();
    assert_eq!(names, vec!["shell-v2".to_string()]);
  }

  #[test]
  fn test_sweep_stale_is_idempotent() {
    let namespaces = manager("v1");
    namespaces.open(StoreKind::Shell).put("k", "u", &response());
    namespaces.open(StoreKind::Misc).put("k", "u", &response());

    let keep = namespaces.keep_list();
    namespaces.sweep_stale(&keep).unwrap();
    let after_first = namespaces.store_counts().unwrap();
    namespaces.sweep_stale(&keep).unwrap();
    let after_second = namespaces.store_counts().unwrap();

    assert_eq!(after_first, after_second);
  }

  #[test]
  fn test_purge_all_clears_every_version() {
    let v1 = manager("v1");
    v1.open(StoreKind::Shell).put("k", "u", &response());
    let v2 = v1.with_version("v2");
    v2.open(StoreKind::Shell).put("k", "u", &response());

    v2.purge_all().unwrap();
    assert!(v2.store_counts().unwrap().is_empty());
  }

  #[test]
  fn test_installed_version_marker() {
    let namespaces = manager("v1");
    assert!(namespaces.installed_version().is_none());
    namespaces.mark_installed().unwrap();
    assert_eq!(namespaces.installed_version().as_deref(), Some("v1"));
  }
}
