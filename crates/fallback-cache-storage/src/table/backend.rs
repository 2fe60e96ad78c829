//! Relational table cache backend on SQLite

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fallback_cache_core::{CacheBackend, CacheError, Result};

/// Configuration for the table backend
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Database file; `None` opens a private in-memory database
    pub path: Option<PathBuf>,
    /// Table holding the entries
    pub table: String,
    /// Optional key prefix
    pub key_prefix: Option<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: "cache".to_string(),
            key_prefix: None,
        }
    }
}

impl TableConfig {
    /// Create config for a database file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Set table name
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set key prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

/// Cache backend storing entries in a `(key, value, expiration)` table
///
/// `expiration` is a Unix timestamp in seconds, `NULL` for entries without
/// TTL. SQLite calls are synchronous and run on the blocking pool.
#[derive(Clone)]
pub struct TableBackend {
    conn: Arc<Mutex<Connection>>,
    config: Arc<TableConfig>,
}

impl TableBackend {
    /// Open the database and create the table if it doesn't exist
    pub async fn open(config: TableConfig) -> Result<Self> {
        if !is_valid_identifier(&config.table) {
            return Err(CacheError::Configuration(format!(
                "invalid cache table name: {:?}",
                config.table
            )));
        }

        let path = config.path.clone();
        let schema = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key TEXT NOT NULL PRIMARY KEY,
                value BLOB NOT NULL,
                expiration INTEGER
            )",
            config.table
        );

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = match &path {
                Some(path) => Connection::open(path),
                None => Connection::open_in_memory(),
            }
            .map_err(|e| CacheError::Configuration(format!("cannot open cache database: {}", e)))?;

            let _ = conn.execute("PRAGMA busy_timeout = 5000", []);
            conn.execute_batch(&schema)
                .map_err(|e| CacheError::Configuration(format!("cannot create cache table: {}", e)))?;
            Ok(conn)
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))??;

        tracing::debug!(table = %config.table, "table cache store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        })
    }

    fn full_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &TableConfig) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn, &config).map_err(|e| CacheError::Backend(e.to_string()))
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }

    /// Delete every expired row and return how many were removed
    pub async fn prune_expired(&self) -> Result<usize> {
        let now = unix_now();
        self.with_conn(move |conn, config| {
            conn.execute(
                &format!(
                    "DELETE FROM {} WHERE expiration IS NOT NULL AND expiration <= ?1",
                    config.table
                ),
                params![now],
            )
        })
        .await
    }
}

#[async_trait]
impl CacheBackend for TableBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = self.full_key(key);
        let now = unix_now();

        self.with_conn(move |conn, config| {
            let row: Option<(Vec<u8>, Option<i64>)> = conn
                .query_row(
                    &format!("SELECT value, expiration FROM {} WHERE key = ?1", config.table),
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((_, Some(expiration))) if expiration <= now => {
                    conn.execute(
                        &format!("DELETE FROM {} WHERE key = ?1", config.table),
                        params![key],
                    )?;
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        let key = self.full_key(key);
        let expiration = ttl.map(|ttl| unix_now().saturating_add(ttl_secs(ttl)));

        self.with_conn(move |conn, config| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (key, value, expiration) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, expiration = excluded.expiration",
                    config.table
                ),
                params![key, value, expiration],
            )
            .map(|changed| changed > 0)
        })
        .await
    }

    async fn forget(&self, key: &str) -> Result<bool> {
        let key = self.full_key(key);
        self.with_conn(move |conn, config| {
            conn.execute(
                &format!("DELETE FROM {} WHERE key = ?1", config.table),
                params![key],
            )
            .map(|changed| changed > 0)
        })
        .await
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Whole seconds, rounded up so a sub-second TTL doesn't expire on write
fn ttl_secs(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
