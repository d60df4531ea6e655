//! Outcomes returned to the view layer and notices broadcast to it.
//!
//! Every mutation returns a [`MutationOutcome`] instead of alerting on its own;
//! the UI decides whether and how to surface a [`Notice`].

use std::fmt;

use crate::records::Collection;

/// Result of a local-first write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Saved locally and mirrored remotely.
    Mirrored,
    /// Saved locally; the collection is local-only or cloud sync is inactive.
    LocalOnly,
    /// Saved locally; the remote call failed and the mirror is stale.
    MirrorFailed { reason: String },
}

/// What happened to the push-back step of a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    NotNeeded,
    Pushed { records: usize },
    /// Restore push withheld until the user confirms it.
    Deferred,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStatus {
    /// The fetch failed or returned an unexpected shape; local left as is.
    RemoteUnavailable,
    Merged {
        records: usize,
        local_only: usize,
        restore: bool,
        push: PushOutcome,
        /// `false` when the merge landed but `last_sync` could not be written.
        checkpoint_saved: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSync {
    pub collection: Collection,
    pub status: CollectionStatus,
}

/// Why reconciliation did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    CloudInactive,
    SignedOut,
}

/// Summary of a startup or manual sync.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncReport {
    /// Tasks moved to the archive before reconciling.
    pub archived: usize,
    /// Set when reconciliation was skipped entirely.
    pub skipped: Option<SkipReason>,
    pub collections: Vec<CollectionSync>,
}

impl SyncReport {
    pub(crate) fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn collection(&self, collection: Collection) -> Option<&CollectionStatus> {
        self.collections
            .iter()
            .find(|c| c.collection == collection)
            .map(|c| &c.status)
    }
}

/// Side-channel notification for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    TasksArchived { count: usize },
    PushFailed { collection: Collection, reason: String },
    MirrorFailed { collection: Collection, reason: String },
    DeleteFailed { collection: Collection, id: String, reason: String },
    RestorePending { collection: Collection, local_records: usize },
    RemoteUnavailable { collection: Collection },
    StorageNearlyFull { key: String, bytes: u64 },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::TasksArchived { count } => write!(f, "Archived {count} completed tasks"),
            Notice::PushFailed { collection, reason } => write!(
                f,
                "Saving {collection} to the cloud failed: {reason}. Your data is kept on this device; check the connection or sign-in and sync again."
            ),
            Notice::MirrorFailed { collection, reason } => write!(
                f,
                "Change saved on this device, but {collection} could not be updated in the cloud: {reason}"
            ),
            Notice::DeleteFailed { collection, id, reason } => write!(
                f,
                "Removed {id} from {collection} on this device, but the cloud delete failed: {reason}"
            ),
            Notice::RestorePending { collection, local_records } => write!(
                f,
                "The cloud {collection} table is empty while this device has {local_records} records. Push local data to restore it."
            ),
            Notice::RemoteUnavailable { collection } => {
                write!(f, "Could not reach the cloud {collection} table; working from local data")
            }
            Notice::StorageNearlyFull { key, bytes } => write!(
                f,
                "Stored {key} is {:.2} MB and close to the device limit. Export a backup and remove unused images.",
                *bytes as f64 / 1024.0 / 1024.0
            ),
        }
    }
}
