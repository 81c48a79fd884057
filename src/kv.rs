//! Key-value store abstraction backing the cache layer.
//!
//! The [`KvStore`] trait is the narrow seam to the external store: opaque
//! byte values keyed by fingerprint, written with a time-to-live. Two
//! implementations are provided:
//!
//! - **[`SqliteKvStore`]** — production store on SQLite (WAL mode). TTL
//!   enforcement on the read path belongs to the cache layer; the store's
//!   own expiration mechanism is an opportunistic sweep of expired rows on
//!   the write path.
//! - **[`InMemoryKvStore`]** — `HashMap` behind an `RwLock`, for tests.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Abstract key-value store with millisecond-capable expiration.
///
/// Keys are fingerprint strings (64 hex chars); values are opaque blobs.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the raw value for `key`, or `None` if absent.
    ///
    /// Implementations do not filter by expiration here; the cache layer
    /// owns the read-path expiry check.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key` with a time-to-live. Overwrites any
    /// existing entry unconditionally — last write wins.
    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()>;
}

/// SQLite-backed store for cache entries.
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Open (creating if missing) the store at `db_path` and ensure the
    /// schema exists. Idempotent.
    pub async fn connect(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expires_at_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT value FROM cache_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<()> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let expires_at_ms = now_ms + (ttl_seconds as i64) * 1000;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at_ms) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at_ms = excluded.expires_at_ms
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at_ms)
        .execute(&self.pool)
        .await?;

        // Store-native expiration: sweep dead rows on the write path so
        // reads never pay for deletion.
        sqlx::query("DELETE FROM cache_entries WHERE expires_at_ms <= ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// In-memory store for tests.
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>, _ttl_seconds: u64) -> Result<()> {
        self.entries.write().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}
