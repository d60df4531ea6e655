#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use shopsync::{RemoteError, RemoteTableClient, Session, ShopSync, ShopSyncBuilder, SyncSettings};

/// In-memory stand-in for the remote table store.
#[derive(Default)]
pub struct FakeRemote {
    inner: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    active: bool,
    /// `None` means the table is missing and every fetch fails.
    tables: HashMap<String, Option<Vec<Value>>>,
    fail_upsert: bool,
    fail_delete: bool,
    session: Option<Session>,
    upserts: Vec<(String, usize)>,
    deletes: Vec<(String, String)>,
}

impl FakeRemote {
    /// Active, signed in, both tables present and empty.
    pub fn signed_in() -> Arc<Self> {
        let remote = Self::default();
        {
            let mut s = remote.inner.lock().unwrap();
            s.active = true;
            s.session = Some(test_session());
            s.tables.insert("customers".into(), Some(Vec::new()));
            s.tables.insert("tasks".into(), Some(Vec::new()));
        }
        Arc::new(remote)
    }

    pub fn signed_out() -> Arc<Self> {
        let remote = Self::signed_in();
        remote.inner.lock().unwrap().session = None;
        remote
    }

    pub fn inactive() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_table(&self, table: &str, rows: Vec<Value>) {
        self.inner.lock().unwrap().tables.insert(table.into(), Some(rows));
    }

    pub fn break_table(&self, table: &str) {
        self.inner.lock().unwrap().tables.insert(table.into(), None);
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.inner.lock().unwrap().fail_upsert = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_delete = fail;
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.inner
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .flatten()
            .unwrap_or_default()
    }

    pub fn row_ids(&self, table: &str) -> Vec<String> {
        self.rows(table)
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// `(table, row count)` of every upsert received.
    pub fn upserts(&self) -> Vec<(String, usize)> {
        self.inner.lock().unwrap().upserts.clone()
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().deletes.clone()
    }
}

#[async_trait]
impl RemoteTableClient for FakeRemote {
    fn is_active(&self) -> bool {
        self.inner.lock().unwrap().active
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Value>, RemoteError> {
        let s = self.inner.lock().unwrap();
        match s.tables.get(table) {
            Some(Some(rows)) => Ok(rows.clone()),
            _ => Err(RemoteError::Status {
                status: 404,
                message: format!("relation {table} does not exist"),
            }),
        }
    }

    async fn upsert(&self, table: &str, rows: &[Value]) -> Result<(), RemoteError> {
        let mut s = self.inner.lock().unwrap();
        if s.fail_upsert {
            return Err(RemoteError::Status {
                status: 401,
                message: "JWT expired".into(),
            });
        }
        s.upserts.push((table.to_string(), rows.len()));
        // like a table with a column per key: absent fields come back as null
        let columns: BTreeSet<String> = rows
            .iter()
            .filter_map(Value::as_object)
            .flat_map(|o| o.keys().cloned())
            .collect();
        let stored = s.tables.entry(table.to_string()).or_insert_with(|| Some(Vec::new()));
        let stored = stored.get_or_insert_with(Vec::new);
        for row in rows {
            let mut row = row.clone();
            if let Some(object) = row.as_object_mut() {
                for column in &columns {
                    object.entry(column.clone()).or_insert(Value::Null);
                }
            }
            let id = row.get("id").cloned();
            match stored.iter_mut().find(|r| r.get("id").cloned() == id) {
                Some(existing) => *existing = row,
                None => stored.push(row),
            }
        }
        Ok(())
    }

    async fn delete_by_id(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        let mut s = self.inner.lock().unwrap();
        if s.fail_delete {
            return Err(RemoteError::Status {
                status: 500,
                message: "delete failed".into(),
            });
        }
        s.deletes.push((table.to_string(), id.to_string()));
        if let Some(Some(rows)) = s.tables.get_mut(table) {
            rows.retain(|r| r.get("id").and_then(Value::as_str) != Some(id));
        }
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, RemoteError> {
        if password != "secret" {
            return Err(RemoteError::Status {
                status: 400,
                message: "Invalid login credentials".into(),
            });
        }
        let mut session = test_session();
        session.email = Some(email.to_string());
        self.inner.lock().unwrap().session = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.inner.lock().unwrap().session = None;
        Ok(())
    }

    async fn get_session(&self) -> Option<Session> {
        self.inner.lock().unwrap().session.clone()
    }

    fn restore_session(&self, session: Session) {
        self.inner.lock().unwrap().session = Some(session);
    }
}

pub fn test_session() -> Session {
    Session {
        access_token: "token".into(),
        refresh_token: None,
        expires_at: i64::MAX,
        email: Some("owner@example.com".into()),
    }
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap()
}

pub async fn app_with(remote: Arc<FakeRemote>) -> ShopSync {
    app_with_settings(remote, SyncSettings::default()).await
}

pub async fn app_with_settings(remote: Arc<FakeRemote>, settings: SyncSettings) -> ShopSync {
    let _ = env_logger::builder().is_test(true).try_init();
    ShopSyncBuilder::new("sqlite::memory:")
        .with_remote(remote)
        .with_settings(settings)
        .build()
        .await
        .expect("Failed to build ShopSync")
}
