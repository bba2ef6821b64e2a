//! Cache storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trait for cache storage backends.
///
/// Keys are opaque, already-hashed strings; values are serialized bytes.
pub trait CacheStorage: Send + Sync {
  /// Get the stored bytes for a key.
  fn get_raw(&self, key_hash: &str) -> Result<Option<Vec<u8>>>;

  /// Insert or replace the bytes stored under a key.
  fn put_raw(&self, key_hash: &str, namespace: &str, description: &str, data: &[u8])
    -> Result<()>;

  /// Remove a single key.
  fn delete(&self, key_hash: &str) -> Result<()>;

  /// Remove every key in a namespace, returning how many were dropped.
  fn delete_namespace(&self, namespace: &str) -> Result<usize>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get_raw(&self, _key_hash: &str) -> Result<Option<Vec<u8>>> {
    Ok(None) // Always miss
  }

  fn put_raw(
    &self,
    _key_hash: &str,
    _namespace: &str,
    _description: &str,
    _data: &[u8],
  ) -> Result<()> {
    Ok(()) // Discard
  }

  fn delete(&self, _key_hash: &str) -> Result<()> {
    Ok(())
  }

  fn delete_namespace(&self, _namespace: &str) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open (or create) the cache database at a specific path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Volatile database, mostly useful for tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("rewards-sync").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    key_hash TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    description TEXT NOT NULL,
    data BLOB NOT NULL,
    written_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_kv_cache_namespace ON kv_cache(namespace);
"#;

impl CacheStorage for SqliteStorage {
  fn get_raw(&self, key_hash: &str) -> Result<Option<Vec<u8>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT data FROM kv_cache WHERE key_hash = ?",
        params![key_hash],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))
  }

  fn put_raw(
    &self,
    key_hash: &str,
    namespace: &str,
    description: &str,
    data: &[u8],
  ) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv_cache (key_hash, namespace, description, data, written_at)
         VALUES (?, ?, ?, ?, datetime('now'))",
        params![key_hash, namespace, description, data],
      )
      .map_err(|e| eyre!("Failed to store cache entry {}: {}", description, e))?;

    Ok(())
  }

  fn delete(&self, key_hash: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv_cache WHERE key_hash = ?", params![key_hash])
      .map_err(|e| eyre!("Failed to delete cache entry: {}", e))?;

    Ok(())
  }

  fn delete_namespace(&self, namespace: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM kv_cache WHERE namespace = ?", params![namespace])
      .map_err(|e| eyre!("Failed to clear cache namespace {}: {}", namespace, e))
  }
}
