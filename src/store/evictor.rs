//! FIFO capacity enforcement for the bounded store kinds.

use tracing::debug;

use crate::config::CapacityConfig;

use super::backend::StoreBackend;
use super::namespace::{Store, StoreKind};

/// Enforces a maximum entry count per store, invoked after every
/// successful write to a bounded kind.
///
/// Eviction is FIFO by the entries' explicit seq counters. Concurrent
/// passes on the same store can interleave and transiently overshoot
/// the cap; the next write corrects it.
#[derive(Debug, Clone)]
pub struct CapacityEvictor {
  capacity: CapacityConfig,
}

impl CapacityEvictor {
  pub fn new(capacity: CapacityConfig) -> Self {
    Self { capacity }
  }

  /// Maximum entry count for `kind`; unbounded kinds return None.
  pub fn cap(&self, kind: StoreKind) -> Option<usize> {
    match kind {
      StoreKind::Images => Some(self.capacity.images),
      StoreKind::Documents => Some(self.capacity.documents),
      StoreKind::Fonts => Some(self.capacity.fonts),
      StoreKind::Api => Some(self.capacity.api),
      StoreKind::Shell | StoreKind::Misc => None,
    }
  }

  /// Trim the store back to its cap, oldest entries first.
  pub fn enforce<B: StoreBackend>(&self, store: &Store<B>) {
    let Some(cap) = self.cap(store.kind()) else {
      return;
    };

    let len = store.len();
    if len > cap {
      let removed = store.evict_oldest(len - cap);
      debug!(store = %store.name(), removed, "evicted over-cap entries");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::response::Response;
  use crate::store::{MemoryBackend, NamespaceManager};

  fn evictor() -> CapacityEvictor {
    CapacityEvictor::new(CapacityConfig {
      images: 3,
      documents: 60,
      fonts: 2,
      api: 50,
    })
  }

  fn response(body: &[u8]) -> Response {
    Response::new(200, None, body.to_vec())
  }

  #[test]
  fn test_under_cap_is_untouched() {
    let namespaces = NamespaceManager::new(MemoryBackend::new(), "v1");
    let store = namespaces.open(StoreKind::Images);
    let evictor = evictor();

    for i in 0..3 {
      store.put(&format!("k{}", i), "u", &response(b"x"));
      evictor.enforce(&store);
    }

    assert_eq!(store.len(), 3);
  }

  #[test]
  fn test_write_past_cap_evicts_oldest() {
    let namespaces = NamespaceManager::new(MemoryBackend::new(), "v1");
    let store = namespaces.open(StoreKind::Fonts);
    let evictor = evictor();

    for i in 0..5 {
      store.put(&format!("k{}", i), "u", &response(b"x"));
      evictor.enforce(&store);
    }

    assert_eq!(store.len(), 2);
    assert!(store.get("k0").is_none());
    assert!(store.get("k1").is_none());
    assert!(store.get("k2").is_none());
    assert!(store.get("k3").is_some());
    assert!(store.get("k4").is_some());
  }

  #[test]
  fn test_unbounded_kinds_never_evict() {
    let namespaces = NamespaceManager::new(MemoryBackend::new(), "v1");
    let store = namespaces.open(StoreKind::Shell);
    let evictor = evictor();

    for i in 0..100 {
      store.put(&format!("k{}", i), "u", &response(b"x"));
      evictor.enforce(&store);
    }

    assert_eq!(store.len(), 100);
  }

  #[test]
  fn test_overwrite_does_not_grow_store() {
    let namespaces = NamespaceManager::new(MemoryBackend::new(), "v1");
    let store = namespaces.open(StoreKind::Fonts);
    let evictor = evictor();

    for _ in 0..10 {
      store.put("same", "u", &response(b"x"));
      evictor.enforce(&store);
    }

    assert_eq!(store.len(), 1);
  }
}
