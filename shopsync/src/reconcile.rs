//! Local/remote merge for one syncable collection.
//!
//! [`reconcile`] is pure: it decides the merged collection and whether a
//! push-back is needed, and [`ShopSync`](crate::ShopSync) performs the writes.
//! A record that exists only locally is never dropped here; remote is a second
//! opinion, not ground truth that can erase local state.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conflict::{ConflictPolicy, should_apply};
use crate::records::Record;

/// Moment the last successful reconciliation pass completed, in milliseconds
/// since the Unix epoch. Zero means "never synced".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(pub i64);

impl Checkpoint {
    pub const NEVER: Checkpoint = Checkpoint(0);

    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn is_never(self) -> bool {
        self.0 == 0
    }
}

impl From<DateTime<Utc>> for Checkpoint {
    fn from(at: DateTime<Utc>) -> Self {
        Checkpoint(at.timestamp_millis())
    }
}

/// Result of merging one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<R> {
    /// The collection that becomes the new local copy.
    pub merged: Vec<R>,
    /// Some record in `merged` is missing or stale remotely.
    pub push_needed: bool,
    /// Remote answered with an empty table while local had records.
    pub restore: bool,
    /// Ids that were only present locally.
    pub local_only: Vec<String>,
    /// Ids present on both sides where the local copy was kept.
    pub kept_local: Vec<String>,
}

/// Merge `local` with the fetched `remote` collection.
///
/// `remote = None` means the remote store was inactive or the fetch failed;
/// local is returned unchanged and nothing is pushed. Otherwise every remote
/// record is taken in remote order (subject to `policy` on id collisions), then
/// every local record whose id is absent remotely is appended and flags
/// `push_needed`.
///
/// `last_sync` is carried for diagnostics only; no per-record recency is
/// derived from it.
pub fn reconcile<R: Record>(
    local: Vec<R>,
    remote: Option<Vec<R>>,
    last_sync: Checkpoint,
    policy: ConflictPolicy,
) -> Reconciled<R> {
    let Some(remote) = remote else {
        log::debug!(
            "{}: remote unavailable, keeping {} local records",
            R::COLLECTION,
            local.len()
        );
        return Reconciled {
            merged: local,
            push_needed: false,
            restore: false,
            local_only: Vec::new(),
            kept_local: Vec::new(),
        };
    };

    let restore = remote.is_empty() && !local.is_empty();
    if restore {
        log::info!(
            "{}: remote is empty but {} local records exist (restore mode)",
            R::COLLECTION,
            local.len()
        );
    }

    let local_by_id: HashMap<&str, &R> = local.iter().map(|r| (r.id(), r)).collect();
    let remote_ids: HashSet<&str> = remote.iter().map(|r| r.id()).collect();

    let mut merged = Vec::with_capacity(remote.len() + local.len());
    let mut kept_local = Vec::new();
    for record in &remote {
        let local_copy = local_by_id.get(record.id()).copied();
        if should_apply(record, local_copy, policy) {
            merged.push(record.clone());
        } else if let Some(local_copy) = local_copy {
            kept_local.push(local_copy.id().to_string());
            merged.push(local_copy.clone());
        }
    }

    let mut local_only = Vec::new();
    for record in &local {
        if !remote_ids.contains(record.id()) {
            log::debug!("{}: preserving local-only record {}", R::COLLECTION, record.id());
            local_only.push(record.id().to_string());
            merged.push(record.clone());
        }
    }

    let push_needed = !local_only.is_empty() || !kept_local.is_empty();
    log::debug!(
        "{}: merged {} remote + {} local-only records (last sync {})",
        R::COLLECTION,
        remote.len(),
        local_only.len(),
        last_sync.millis()
    );

    Reconciled {
        merged,
        push_needed,
        restore,
        local_only,
        kept_local,
    }
}
