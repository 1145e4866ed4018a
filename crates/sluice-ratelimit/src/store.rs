//! Counter stores for the fixed-window limiter
//!
//! The limiter needs exactly one primitive: atomically increment a keyed
//! counter, creating it with a TTL when absent and resetting it when its
//! window has lapsed. [`MemoryCounterStore`] serves single-process
//! deployments and tests; [`SqliteCounterStore`] gives several gateway
//! processes a shared window.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

/// Counter state after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Requests recorded in the current window, this one included.
    pub count: u64,
    /// When the current window lapses.
    pub expires_at: DateTime<Utc>,
}

/// The shared key/value store the limiter counts in.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increments `key`. A missing or lapsed counter restarts
    /// at 1 with a fresh TTL of `window`.
    async fn increment(&self, key: &str, window: Duration) -> anyhow::Result<WindowCount>;
}

/// In-process store backed by a concurrent map.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, WindowCount>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> anyhow::Result<WindowCount> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::from_std(window)?;
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(WindowCount { count: 0, expires_at });
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = expires_at;
        }
        entry.count += 1;
        Ok(*entry)
    }
}

/// SQLite-backed store so multiple gateway processes share one window.
pub struct SqliteCounterStore {
    pool: SqlitePool,
}

impl SqliteCounterStore {
    /// Opens (creating if missing) the counter database at `path`.
    pub async fn connect(path: &Path) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn with_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rate_windows (
                key TEXT PRIMARY KEY,
                count INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Removes lapsed rows; counters self-reset on increment, so this is
    /// housekeeping only.
    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM rate_windows WHERE expires_at <= ?1")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> anyhow::Result<WindowCount> {
        let now = Utc::now().timestamp();
        let fresh_expiry = now + window.as_secs() as i64;

        // Single upsert so concurrent gateway processes never lose counts.
        let row = sqlx::query(
            "INSERT INTO rate_windows (key, count, expires_at) VALUES (?1, 1, ?2)
             ON CONFLICT(key) DO UPDATE SET
                 count = CASE WHEN rate_windows.expires_at <= ?3
                              THEN 1 ELSE rate_windows.count + 1 END,
                 expires_at = CASE WHEN rate_windows.expires_at <= ?3
                                   THEN ?2 ELSE rate_windows.expires_at END
             RETURNING count, expires_at",
        )
        .bind(key)
        .bind(fresh_expiry)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        let expires_at: i64 = row.get("expires_at");
        Ok(WindowCount {
            count: count as u64,
            expires_at: Utc
                .timestamp_opt(expires_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_counts_within_window() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_secs(60);
        assert_eq!(store.increment("k", window).await.unwrap().count, 1);
        assert_eq!(store.increment("k", window).await.unwrap().count, 2);
        assert_eq!(store.increment("other", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_memory_store_resets_after_window() {
        let store = MemoryCounterStore::new();
        let window = Duration::from_millis(50);
        assert_eq!(store.increment("k", window).await.unwrap().count, 1);
        assert_eq!(store.increment("k", window).await.unwrap().count, 2);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.increment("k", window).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_sqlite_store_counts_and_resets() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteCounterStore::connect(&dir.path().join("limits.db"))
            .await
            .unwrap();

        let window = Duration::from_secs(60);
        let first = store.increment("bearer:abc", window).await.unwrap();
        assert_eq!(first.count, 1);
        assert!(first.expires_at > Utc::now());
        let second = store.increment("bearer:abc", window).await.unwrap();
        assert_eq!(second.count, 2);
        // The window expiry does not slide on subsequent hits.
        assert_eq!(first.expires_at, second.expires_at);

        let zero_window = Duration::from_secs(0);
        store.increment("stale", zero_window).await.unwrap();
        let reset = store.increment("stale", window).await.unwrap();
        assert_eq!(reset.count, 1);
    }

    #[tokio::test]
    async fn test_sqlite_purge_removes_lapsed_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SqliteCounterStore::connect(&dir.path().join("limits.db"))
            .await
            .unwrap();
        store
            .increment("gone", Duration::from_secs(0))
            .await
            .unwrap();
        store
            .increment("kept", Duration::from_secs(300))
            .await
            .unwrap();
        let purged = store.purge_expired().await.unwrap();
        assert_eq!(purged, 1);
    }
}
