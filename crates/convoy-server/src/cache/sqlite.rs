//! SQLite cache backend
//!
//! Each operation opens its own connection on a blocking thread and runs a
//! single statement, which keeps every get/set/remove individually atomic.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::{CacheError, CacheStore};

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent cache stored in a single SQLite file
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    db_path: PathBuf,
}

impl SqliteCacheStore {
    /// Open (and create if needed) the cache database at `db_path`
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let store = Self {
            db_path: db_path.into(),
        };
        let path = store.db_path.clone();
        tokio::task::spawn_blocking(move || init_schema(&path)).await??;
        info!(path = %store.db_path.display(), "Fingerprint cache opened");
        Ok(store)
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_connection(&path)?;
            f(&conn)
        })
        .await?
    }
}

fn open_connection(path: &Path) -> Result<Connection, CacheError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn init_schema(path: &Path) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = open_connection(path)?;
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        [],
    )?;

    debug!("Cache schema initialized");
    Ok(())
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_connection(move |conn| {
            conn.execute(
                r#"
                INSERT INTO cache_entries (key, value, updated_at)
                VALUES (?1, ?2, CURRENT_TIMESTAMP)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = CURRENT_TIMESTAMP
                "#,
                params![key, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            let removed = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            Ok(removed > 0)
        })
        .await
    }
}
