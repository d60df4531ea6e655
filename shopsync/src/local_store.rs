//! Durable on-device persistence of named collections.
//!
//! The `_shopsync_store` table holds one row per key: each collection is a
//! single JSON array, and scalars (`last_sync`, `cloud_config`, `auth_session`)
//! are single JSON values. The table is created by [`LocalStore::open`].
//!
//! The store enforces a byte quota over the total stored payload. A save that
//! would cross it fails with [`StoreError::CapacityExceeded`] and leaves the
//! previous value in place.

use chrono::Utc;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    FromQueryResult, Statement,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::StoreError;
use crate::reconcile::Checkpoint;
use crate::records::{Collection, Record};

pub const LAST_SYNC_KEY: &str = "last_sync";
pub const CLOUD_CONFIG_KEY: &str = "cloud_config";
pub const SESSION_KEY: &str = "auth_session";

/// Default total quota, the usual browser local-storage budget.
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;
/// A single value above this size logs a warning.
pub const DEFAULT_WARN_BYTES: u64 = 4_000_000;

/// Outcome of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    /// Size of the value just written.
    pub bytes: u64,
    /// The value crossed the warn threshold.
    pub near_capacity: bool,
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    db: DatabaseConnection,
    quota_bytes: u64,
    warn_bytes: u64,
}

#[derive(Debug, FromQueryResult)]
struct ValueRow {
    value: String,
}

#[derive(Debug, FromQueryResult)]
struct UsageRow {
    total: i64,
}

impl LocalStore {
    /// Connect to `database_url` (e.g. `sqlite://shop.db?mode=rwc` or
    /// `sqlite::memory:`) and create the store table if needed.
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let mut options = ConnectOptions::new(database_url);
        if database_url.contains(":memory:") {
            // every pooled connection would otherwise see its own empty database
            options.max_connections(1).min_connections(1);
        }
        let db = Database::connect(options).await?;
        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS _shopsync_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .await?;
        log::debug!("Local store ready at {database_url}");
        Ok(Self {
            db,
            quota_bytes: DEFAULT_QUOTA_BYTES,
            warn_bytes: DEFAULT_WARN_BYTES,
        })
    }

    pub fn with_limits(mut self, quota_bytes: u64, warn_bytes: u64) -> Self {
        self.quota_bytes = quota_bytes;
        self.warn_bytes = warn_bytes;
        self
    }

    /// Read a collection. A collection that was never written is empty.
    pub async fn get<R: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<R>, StoreError> {
        Ok(self.get_value(collection.key()).await?.unwrap_or_default())
    }

    /// Overwrite a whole collection.
    pub async fn save<R: Serialize>(
        &self,
        collection: Collection,
        records: &[R],
    ) -> Result<SaveReport, StoreError> {
        self.put_value(collection.key(), records).await
    }

    /// Remove one record by id from its collection. Returns whether it existed.
    pub async fn delete<R: Record>(&self, id: &str) -> Result<bool, StoreError> {
        let mut records: Vec<R> = self.get(R::COLLECTION).await?;
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save(R::COLLECTION, &records).await?;
        Ok(true)
    }

    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let row = ValueRow::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT value FROM _shopsync_store WHERE key = $1",
            [key.into()],
        ))
        .one(&self.db)
        .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.value)?)),
            None => Ok(None),
        }
    }

    pub async fn put_value<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<SaveReport, StoreError> {
        let json = serde_json::to_string(value)?;
        let bytes = json.len() as u64;

        let required = self.usage_excluding(key).await? + bytes;
        if required > self.quota_bytes {
            log::error!(
                "Local save of `{key}` rejected: {required} bytes exceeds quota of {} bytes",
                self.quota_bytes
            );
            return Err(StoreError::CapacityExceeded {
                key: key.to_string(),
                required,
                quota: self.quota_bytes,
            });
        }

        self.db
            .execute_raw(Statement::from_sql_and_values(
                DatabaseBackend::Sqlite,
                "INSERT OR REPLACE INTO _shopsync_store (key, value, updated_at) VALUES ($1, $2, $3)",
                [
                    key.into(),
                    json.into(),
                    Utc::now().timestamp_millis().into(),
                ],
            ))
            .await?;

        let near_capacity = bytes > self.warn_bytes;
        if near_capacity {
            log::warn!(
                "Data size for `{key}` is large ({:.2} MB), close to the storage limit",
                bytes as f64 / 1024.0 / 1024.0
            );
        }
        Ok(SaveReport {
            bytes,
            near_capacity,
        })
    }

    pub async fn remove_value(&self, key: &str) -> Result<(), StoreError> {
        self.db
            .execute_raw(Statement::from_sql_and_values(
                DatabaseBackend::Sqlite,
                "DELETE FROM _shopsync_store WHERE key = $1",
                [key.into()],
            ))
            .await?;
        Ok(())
    }

    /// Total stored payload in bytes.
    pub async fn usage_bytes(&self) -> Result<u64, StoreError> {
        self.usage_excluding("").await
    }

    pub async fn last_sync(&self) -> Result<Checkpoint, StoreError> {
        Ok(self.get_value(LAST_SYNC_KEY).await?.unwrap_or(Checkpoint::NEVER))
    }

    pub async fn set_last_sync(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        self.put_value(LAST_SYNC_KEY, &checkpoint).await?;
        Ok(())
    }

    async fn usage_excluding(&self, key: &str) -> Result<u64, StoreError> {
        let row = UsageRow::find_by_statement(Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0) AS total
             FROM _shopsync_store WHERE key <> $1",
            [key.into()],
        ))
        .one(&self.db)
        .await?;
        Ok(row.map(|r| r.total.max(0) as u64).unwrap_or(0))
    }
}
