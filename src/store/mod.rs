//! Versioned persistent cache stores.
//!
//! This module owns every persistent store in the system:
//! - one named store per resource kind per version token ("namespace"),
//! - a storage backend trait with SQLite and in-memory implementations,
//! - FIFO capacity enforcement for the bounded kinds.
//!
//! Strategy executors never touch physical storage directly; all reads
//! and writes go through the [`NamespaceManager`].

mod backend;
mod evictor;
mod namespace;

pub use backend::{CachedResponse, MemoryBackend, SqliteBackend, StoreBackend};
pub use evictor::CapacityEvictor;
pub use namespace::{NamespaceManager, Store, StoreKind};
