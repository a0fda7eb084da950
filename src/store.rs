//! [`FingerprintStore`] implementations.
//!
//! - **[`SqliteFingerprintStore`]** persists fingerprints in the
//!   `sync_fingerprints` table, one row per key.
//! - **[`InMemoryFingerprintStore`]** keeps them in a `HashMap` behind a
//!   `RwLock`; used by tests and by embedders that do not need durability.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::models::SyncFingerprint;
use crate::traits::FingerprintStore;

/// SQLite implementation of [`FingerprintStore`].
pub struct SqliteFingerprintStore {
    pool: SqlitePool,
}

impl SqliteFingerprintStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the configured database and make sure the schema exists.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::open_pool(&config.db.path).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl FingerprintStore for SqliteFingerprintStore {
    async fn get(&self, key: &str) -> Result<Option<SyncFingerprint>> {
        let row = sqlx::query(
            "SELECT content_hash, remote_timestamp FROM sync_fingerprints WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| SyncFingerprint {
            content_hash: r.get("content_hash"),
            remote_timestamp: r.get("remote_timestamp"),
        }))
    }

    async fn set(&self, key: &str, fingerprint: &SyncFingerprint) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO sync_fingerprints (key, content_hash, remote_timestamp, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_hash = excluded.content_hash,
                remote_timestamp = excluded.remote_timestamp,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&fingerprint.content_hash)
        .bind(&fingerprint.remote_timestamp)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// In-memory fingerprint store.
pub struct InMemoryFingerprintStore {
    entries: RwLock<HashMap<String, SyncFingerprint>>,
    writes: RwLock<u64>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            writes: RwLock::new(0),
        }
    }

    /// Number of successful `set` calls.
    pub fn write_count(&self) -> u64 {
        *self.writes.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryFingerprintStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn get(&self, key: &str) -> Result<Option<SyncFingerprint>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow::anyhow!("fingerprint store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, fingerprint: &SyncFingerprint) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow::anyhow!("fingerprint store lock poisoned"))?;
        entries.insert(key.to_string(), fingerprint.clone());
        let mut writes = self
            .writes
            .write()
            .map_err(|_| anyhow::anyhow!("fingerprint store lock poisoned"))?;
        *writes += 1;
        Ok(())
    }
}
