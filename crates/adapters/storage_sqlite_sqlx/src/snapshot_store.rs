//! `SQLite` implementation of [`SnapshotStore`].

use sqlx::SqlitePool;

use homedash_app::ports::SnapshotStore;
use homedash_domain::error::HomeDashError;
use homedash_domain::time::now;

use crate::error::StorageError;

const UPSERT: &str = r"
    INSERT INTO snapshots (key, value, updated_at)
    VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
";

const SELECT_BY_KEY: &str = "SELECT value FROM snapshots WHERE key = ?";
const DELETE_BY_KEY: &str = "DELETE FROM snapshots WHERE key = ?";
const SELECT_KEYS: &str = "SELECT key FROM snapshots ORDER BY key";

/// `SQLite`-backed snapshot storage; values are stored as JSON text.
#[derive(Clone)]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, HomeDashError> {
        let row: Option<(String,)> = sqlx::query_as(SELECT_BY_KEY)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;

        let Some((json,)) = row else {
            return Ok(None);
        };
        let value = serde_json::from_str(&json).map_err(StorageError::from)?;
        Ok(Some(value))
    }

    async fn save(&self, key: &str, value: serde_json::Value) -> Result<(), HomeDashError> {
        let json = serde_json::to_string(&value).map_err(StorageError::from)?;

        sqlx::query(UPSERT)
            .bind(key)
            .bind(&json)
            .bind(now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), HomeDashError> {
        sqlx::query(DELETE_BY_KEY)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, HomeDashError> {
        let rows: Vec<(String,)> = sqlx::query_as(SELECT_KEYS)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::from)?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}
