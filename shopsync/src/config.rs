//! Cloud credentials and sync tuning.
//!
//! Cloud sync is optional. When no [`CloudConfig`] can be resolved the app runs
//! local-only, which is a valid permanent mode rather than an error.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::archive::default_retention;
use crate::conflict::ConflictPolicy;
use crate::error::StoreError;
use crate::local_store::{CLOUD_CONFIG_KEY, DEFAULT_QUOTA_BYTES, DEFAULT_WARN_BYTES, LocalStore};

pub const ENV_SUPABASE_URL: &str = "SHOPSYNC_SUPABASE_URL";
pub const ENV_SUPABASE_KEY: &str = "SHOPSYNC_SUPABASE_KEY";

/// Endpoint and anon key of the remote table store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    pub url: String,
    pub key: String,
}

impl CloudConfig {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key: key.into(),
        }
    }

    /// Both the URL and the key are present.
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.key.trim().is_empty()
    }

    /// Read `SHOPSYNC_SUPABASE_URL` / `SHOPSYNC_SUPABASE_KEY`.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var(ENV_SUPABASE_URL).ok()?;
        let key = std::env::var(ENV_SUPABASE_KEY).ok()?;
        Some(Self::new(url, key)).filter(CloudConfig::is_configured)
    }

    /// Config saved in the local store wins over the environment.
    pub async fn resolve(store: &LocalStore) -> Result<Option<Self>, StoreError> {
        let saved: Option<CloudConfig> = store.get_value(CLOUD_CONFIG_KEY).await?;
        Ok(saved.filter(CloudConfig::is_configured).or_else(CloudConfig::from_env))
    }

    pub async fn save(&self, store: &LocalStore) -> Result<(), StoreError> {
        store.put_value(CLOUD_CONFIG_KEY, self).await?;
        Ok(())
    }
}

/// What to do when the remote table is empty but local records exist.
///
/// An empty remote may mean a reset or freshly created table that should be
/// repopulated, or an intentional wipe. Local data is preserved either way;
/// the policy only decides whether it is pushed back automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    #[default]
    AutoPush,
    RequireConfirmation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub restore_policy: RestorePolicy,
    pub conflict_policy: ConflictPolicy,
    /// Age after completion at which a done task is archived.
    pub archive_after: TimeDelta,
    pub storage_quota_bytes: u64,
    pub storage_warn_bytes: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            restore_policy: RestorePolicy::default(),
            conflict_policy: ConflictPolicy::default(),
            archive_after: default_retention(),
            storage_quota_bytes: DEFAULT_QUOTA_BYTES,
            storage_warn_bytes: DEFAULT_WARN_BYTES,
        }
    }
}
