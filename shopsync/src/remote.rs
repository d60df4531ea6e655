//! Remote table store surface.
//!
//! One logical table per syncable collection, supporting select-all, upsert by
//! id and delete by id, plus password sign-in. [`SupabaseClient`](crate::SupabaseClient)
//! is the HTTP implementation; tests plug in their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;
use crate::records::Record;

/// An authenticated session against the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry in milliseconds since the Unix epoch.
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() >= self.expires_at
    }
}

#[async_trait]
pub trait RemoteTableClient: Send + Sync {
    /// Valid credentials are configured.
    fn is_active(&self) -> bool;

    /// Every row of `table`.
    async fn fetch_all(&self, table: &str) -> Result<Vec<Value>, RemoteError>;

    /// Insert-or-update `rows` by `id`. Idempotent.
    async fn upsert(&self, table: &str, rows: &[Value]) -> Result<(), RemoteError>;

    async fn delete_by_id(&self, table: &str, id: &str) -> Result<(), RemoteError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, RemoteError>;

    async fn sign_out(&self) -> Result<(), RemoteError>;

    /// The current unexpired session, if any.
    async fn get_session(&self) -> Option<Session>;

    /// Reinstate a session persisted by an earlier run.
    fn restore_session(&self, session: Session);

    /// Cheap reachability check against `table`.
    async fn probe(&self, table: &str) -> Result<(), RemoteError> {
        self.fetch_all(table).await.map(|_| ())
    }
}

/// Fetch and decode a whole remote collection.
///
/// Returns `None` when the client is inactive, the request fails, or any row
/// does not decode into `R`; a malformed response never reaches the merge.
pub async fn fetch_collection<R: Record>(client: &dyn RemoteTableClient, table: &str) -> Option<Vec<R>> {
    if !client.is_active() {
        return None;
    }
    let rows = match client.fetch_all(table).await {
        Ok(rows) => rows,
        Err(e) => {
            log::error!("Error fetching {table}: {e}");
            return None;
        }
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        if !row.is_object() {
            log::error!("Error fetching {table}: row is not an object: {row}");
            return None;
        }
        match serde_json::from_value::<R>(row) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::error!("Error decoding {table} row: {e}");
                return None;
            }
        }
    }
    Some(records)
}

/// Encode records as JSON rows for [`RemoteTableClient::upsert`].
pub fn encode_rows<R: Record>(records: &[R]) -> Result<Vec<Value>, serde_json::Error> {
    records.iter().map(serde_json::to_value).collect()
}
