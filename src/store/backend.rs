//! Storage backend trait, with SQLite and in-memory implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::response::{Response, ResponseSource};

/// A response read back from a store, with its insertion metadata.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct CachedResponse {
  pub response: Response,
  /// When the entry was written.
  pub cached_at: DateTime<Utc>,
  /// Explicit insertion counter; eviction removes lowest-seq entries
  /// first. An overwrite re-stamps the entry with a fresh seq.
  pub seq: i64,
}

/// Trait for cache storage backends.
///
/// Stores are flat namespaces of `(request_key -> response snapshot)`
/// with at most one live entry per key; a put overwrites in place.
pub trait StoreBackend: Send + Sync + 'static {
  /// Create the store if it does not exist yet. Idempotent.
  fn ensure_store(&self, store: &str) -> Result<()>;

  /// Write an entry, overwriting any previous entry for the key.
  fn put(&self, store: &str, key: &str, url: &str, response: &Response) -> Result<()>;

  /// Read an entry back.
  fn get(&self, store: &str, key: &str) -> Result<Option<CachedResponse>>;

  /// Number of live entries in the store.
  fn len(&self, store: &str) -> Result<usize>;

  /// Delete the `count` oldest entries (lowest seq first). Returns how
  /// many were removed.
  fn evict_oldest(&self, store: &str, count: usize) -> Result<usize>;

  /// Names of all existing stores, any version.
  fn list_stores(&self) -> Result<Vec<String>>;

  /// Delete a store and all its entries. Idempotent.
  fn delete_store(&self, store: &str) -> Result<()>;

  /// Read a persisted metadata value.
  fn get_meta(&self, key: &str) -> Result<Option<String>>;

  /// Persist a metadata value.
  fn set_meta(&self, key: &str, value: &str) -> Result<()>;
}

/// Schema for the cache database.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots. seq is an explicit insertion counter so eviction
-- order is stored state, not an assumption about row iteration order.
CREATE TABLE IF NOT EXISTS entries (
    store TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    seq INTEGER NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, request_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_store_seq ON entries(store, seq);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// SQLite-based storage.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
}

impl SqliteBackend {
  /// Open (creating if absent) the database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let backend = Self {
      conn: Mutex::new(conn),
    };
    backend.run_migrations()?;

    Ok(backend)
  }

  /// Open the database at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// An ephemeral in-memory database; used by tests.
  #[allow(dead_code)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    let backend = Self {
      conn: Mutex::new(conn),
    };
    backend.run_migrations()?;

    Ok(backend)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offramp").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl StoreBackend for SqliteBackend {
  fn ensure_store(&self, store: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR IGNORE INTO stores (name) VALUES (?)",
        params![store],
      )
      .map_err(|e| eyre!("Failed to create store {}: {}", store, e))?;

    Ok(())
  }

  fn put(&self, store: &str, key: &str, url: &str, response: &Response) -> Result<()> {
    let conn = self.lock()?;

    // The seq subquery sees all current rows, so an overwrite still gets
    // a fresh, strictly larger counter.
    conn
      .execute(
        "INSERT OR REPLACE INTO entries (store, request_key, url, status, content_type, body, seq, cached_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                 (SELECT COALESCE(MAX(seq), 0) + 1 FROM entries WHERE store = ?1),
                 datetime('now'))",
        params![
          store,
          key,
          url,
          response.status,
          response.content_type,
          response.body
        ],
      )
      .map_err(|e| eyre!("Failed to store entry: {}", e))?;

    Ok(())
  }

  fn get(&self, store: &str, key: &str) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT status, content_type, body, seq, cached_at FROM entries
         WHERE store = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, Option<String>, Vec<u8>, i64, String)> = stmt
      .query_row(params![store, key], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
        ))
      })
      .ok();

    match row {
      Some((status, content_type, body, seq, cached_at_str)) => {
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(CachedResponse {
          response: Response::new(status, content_type, body).with_source(ResponseSource::Cache),
          cached_at,
          seq,
        }))
      }
      None => Ok(None),
    }
  }

  fn len(&self, store: &str) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE store = ?",
        params![store],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries: {}", e))?;

    Ok(count as usize)
  }

  fn evict_oldest(&self, store: &str, count: usize) -> Result<usize> {
    let conn = self.lock()?;

    let removed = conn
      .execute(
        "DELETE FROM entries WHERE store = ?1 AND request_key IN
           (SELECT request_key FROM entries WHERE store = ?1 ORDER BY seq ASC LIMIT ?2)",
        params![store, count as i64],
      )
      .map_err(|e| eyre!("Failed to evict entries: {}", e))?;

    Ok(removed)
  }

  fn list_stores(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM stores ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list stores: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM entries WHERE store = ?", params![store])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", store, e))?;
    conn
      .execute("DELETE FROM stores WHERE name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete store {}: {}", store, e))?;

    Ok(())
  }

  fn get_meta(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT value FROM meta WHERE key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    Ok(stmt.query_row(params![key], |row| row.get(0)).ok())
  }

  fn set_meta(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to set meta {}: {}", key, e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[derive(Debug, Clone)]
struct MemoryEntry {
  response: Response,
  cached_at: DateTime<Utc>,
  seq: i64,
}

#[derive(Debug, Default)]
struct MemoryStore {
  entries: HashMap<String, MemoryEntry>,
  next_seq: i64,
}

/// In-memory storage for ephemeral mode and tests; same semantics as
/// [`SqliteBackend`], nothing survives the process.
#[derive(Default)]
#[allow(dead_code)]
pub struct MemoryBackend {
  stores: Mutex<HashMap<String, MemoryStore>>,
  meta: Mutex<HashMap<String, String>>,
}

#[allow(dead_code)]
impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryStore>>> {
    self
      .stores
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl StoreBackend for MemoryBackend {
  fn ensure_store(&self, store: &str) -> Result<()> {
    self.lock()?.entry(store.to_string()).or_default();
    Ok(())
  }

  fn put(&self, store: &str, key: &str, _url: &str, response: &Response) -> Result<()> {
    let mut stores = self.lock()?;
    let data = stores.entry(store.to_string()).or_default();
    data.next_seq += 1;
    data.entries.insert(
      key.to_string(),
      MemoryEntry {
        response: response.clone().with_source(ResponseSource::Cache),
        cached_at: Utc::now(),
        seq: data.next_seq,
      },
    );
    Ok(())
  }

  fn get(&self, store: &str, key: &str) -> Result<Option<CachedResponse>> {
    let stores = self.lock()?;
    Ok(stores.get(store).and_then(|data| {
      data.entries.get(key).map(|entry| CachedResponse {
        response: entry.response.clone(),
        cached_at: entry.cached_at,
        seq: entry.seq,
      })
    }))
  }

  fn len(&self, store: &str) -> Result<usize> {
    let stores = self.lock()?;
    Ok(stores.get(store).map(|data| data.entries.len()).unwrap_or(0))
  }

  fn evict_oldest(&self, store: &str, count: usize) -> Result<usize> {
    let mut stores = self.lock()?;
    let Some(data) = stores.get_mut(store) else {
      return Ok(0);
    };

    let mut by_seq: Vec<(i64, String)> = data
      .entries
      .iter()
      .map(|(key, entry)| (entry.seq, key.clone()))
      .collect();
    by_seq.sort();

    let victims: Vec<String> = by_seq.into_iter().take(count).map(|(_, key)| key).collect();
    for key in &victims {
      data.entries.remove(key);
    }

    Ok(victims.len())
  }

  fn list_stores(&self) -> Result<Vec<String>> {
    let stores = self.lock()?;
    let mut names: Vec<String> = stores.keys().cloned().collect();
    names.sort();
    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<()> {
    self.lock()?.remove(store);
    Ok(())
  }

  fn get_meta(&self, key: &str) -> Result<Option<String>> {
    let meta = self.meta.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(meta.get(key).cloned())
  }

  fn set_meta(&self, key: &str, value: &str) -> Result<()> {
    let mut meta = self.meta.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    meta.insert(key.to_string(), value.to_string());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(body: &[u8]) -> Response {
    Response::new(200, Some("text/plain".to_string()), body.to_vec())
  }

  fn backends() -> Vec<Box<dyn StoreBackend>> {
    vec![
      Box::new(SqliteBackend::open_in_memory().unwrap()),
      Box::new(MemoryBackend::new()),
    ]
  }

  #[test]
  fn test_put_get_round_trip() {
    for backend in backends() {
      backend.ensure_store("images-1").unwrap();
      backend
        .put("images-1", "k1", "https://x/1.png", &response(b"bytes"))
        .unwrap();

      let hit = backend.get("images-1", "k1").unwrap().unwrap();
      assert_eq!(hit.response.status, 200);
      assert_eq!(hit.response.body, b"bytes");
      assert_eq!(hit.response.source, ResponseSource::Cache);
    }
  }

  #[test]
  fn test_put_overwrites_in_place_and_restamps_seq() {
    for backend in backends() {
      backend.ensure_store("images-1").unwrap();
      backend
        .put("images-1", "k1", "https://x/1.png", &response(b"old"))
        .unwrap();
      let first = backend.get("images-1", "k1").unwrap().unwrap();

      backend
        .put("images-1", "k1", "https://x/1.png", &response(b"new"))
        .unwrap();
      let second = backend.get("images-1", "k1").unwrap().unwrap();

      assert_eq!(backend.len("images-1").unwrap(), 1);
      assert_eq!(second.response.body, b"new");
      assert!(second.seq > first.seq);
    }
  }

  #[test]
  fn test_evict_oldest_removes_lowest_seq_first() {
    for backend in backends() {
      backend.ensure_store("images-1").unwrap();
      for i in 0..5 {
        let key = format!("k{}", i);
        backend
          .put("images-1", &key, "https://x/img", &response(b"x"))
          .unwrap();
      }

      let removed = backend.evict_oldest("images-1", 2).unwrap();
      assert_eq!(removed, 2);
      assert_eq!(backend.len("images-1").unwrap(), 3);
      assert!(backend.get("images-1", "k0").unwrap().is_none());
      assert!(backend.get("images-1", "k1").unwrap().is_none());
      assert!(backend.get("images-1", "k2").unwrap().is_some());
    }
  }

  #[test]
  fn test_overwrite_moves_entry_to_back_of_eviction_order() {
    for backend in backends() {
      backend.ensure_store("images-1").unwrap();
      backend.put("images-1", "a", "u", &response(b"1")).unwrap();
      backend.put("images-1", "b", "u", &response(b"2")).unwrap();
      // Re-put "a": it now counts as the newest insertion
      backend.put("images-1", "a", "u", &response(b"3")).unwrap();

      backend.evict_oldest("images-1", 1).unwrap();
      assert!(backend.get("images-1", "b").unwrap().is_none());
      assert!(backend.get("images-1", "a").unwrap().is_some());
    }
  }

  #[test]
  fn test_store_listing_and_deletion() {
    for backend in backends() {
      backend.ensure_store("images-1").unwrap();
      backend.ensure_store("shell-1").unwrap();
      backend.put("shell-1", "k", "u", &response(b"x")).unwrap();

      let names = backend.list_stores().unwrap();
      assert_eq!(names, vec!["images-1".to_string(), "shell-1".to_string()]);

      backend.delete_store("shell-1").unwrap();
      assert_eq!(backend.list_stores().unwrap(), vec!["images-1".to_string()]);
      assert!(backend.get("shell-1", "k").unwrap().is_none());

      // Deleting again is a no-op
      backend.delete_store("shell-1").unwrap();
    }
  }

  #[test]
  fn test_meta_round_trip() {
    for backend in backends() {
      assert!(backend.get_meta("installed_version").unwrap().is_none());
      backend.set_meta("installed_version", "1.0").unwrap();
      assert_eq!(
        backend.get_meta("installed_version").unwrap().as_deref(),
        Some("1.0")
      );
      backend.set_meta("installed_version", "2.0").unwrap();
      assert_eq!(
        backend.get_meta("installed_version").unwrap().as_deref(),
        Some("2.0")
      );
    }
  }
}
