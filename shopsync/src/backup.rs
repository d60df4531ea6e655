//! Portable snapshot of the two syncable collections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::ShopSync;
use crate::error::BackupError;
use crate::messages::MutationOutcome;
use crate::records::{Customer, Task};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub customers: Vec<Customer>,
    pub tasks: Vec<Task>,
    /// When the snapshot was generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Backup {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Default file name, e.g. `crm_backup_2026-03-20.json`.
pub fn file_name(now: DateTime<Utc>) -> String {
    format!("crm_backup_{}.json", now.format("%Y-%m-%d"))
}

/// Parse a snapshot, requiring both collections before anything is decoded
/// into records.
pub fn parse_backup(bytes: &[u8]) -> Result<Backup, BackupError> {
    let value: Value = serde_json::from_slice(bytes)?;
    for key in ["customers", "tasks"] {
        if !value.get(key).is_some_and(Value::is_array) {
            return Err(BackupError::MissingCollection(key));
        }
    }
    Ok(serde_json::from_value(value)?)
}

/// Outcome of [`ShopSync::import_backup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Imported {
    pub customers: usize,
    pub tasks: usize,
    pub customers_mirror: MutationOutcome,
    pub tasks_mirror: MutationOutcome,
}

impl ShopSync {
    pub fn export_backup(&self, now: DateTime<Utc>) -> Backup {
        Backup {
            customers: self.state().customers.clone(),
            tasks: self.state().tasks.clone(),
            timestamp: Some(now),
        }
    }

    /// Replace local customers and tasks with the snapshot's and mirror both.
    pub async fn import_backup(&mut self, backup: Backup) -> Result<Imported, BackupError> {
        let customers = backup.customers.len();
        let tasks = backup.tasks.len();
        let customers_mirror = self.replace_collection(backup.customers).await?;
        let tasks_mirror = self.replace_collection(backup.tasks).await?;
        log::info!("Imported backup with {customers} customers and {tasks} tasks");
        Ok(Imported {
            customers,
            tasks,
            customers_mirror,
            tasks_mirror,
        })
    }
}
