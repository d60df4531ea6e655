//! Collision rule for records present both locally and remotely.
//!
//! The default is whole-record remote-wins: when the same `id` exists on both
//! sides the remote copy replaces the local one and no field is merged.
//! [`ConflictPolicy::LatestUpdate`] is an opt-in last-write-wins on `updatedAt`.

use serde::{Deserialize, Serialize};

use crate::records::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    RemoteWins,
    LatestUpdate,
}

/// Determine whether the remote copy of a record should replace the local one.
///
/// Returns `true` if:
/// - There is no local copy, or
/// - The policy is [`ConflictPolicy::RemoteWins`], or
/// - Under [`ConflictPolicy::LatestUpdate`], the local `updatedAt` is not strictly
///   newer than the remote one. Ties and missing timestamps go to remote.
pub fn should_apply<R: Record>(remote: &R, local: Option<&R>, policy: ConflictPolicy) -> bool {
    let Some(local) = local else {
        return true;
    };
    match policy {
        ConflictPolicy::RemoteWins => true,
        ConflictPolicy::LatestUpdate => match (local.updated_at(), remote.updated_at()) {
            (Some(local_at), Some(remote_at)) => local_at <= remote_at,
            _ => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Customer;
    use chrono::{DateTime, TimeZone, Utc};

    fn make_customer(name: &str, updated_secs: Option<i64>) -> Customer {
        let now: DateTime<Utc> = Utc.timestamp_opt(0, 0).unwrap();
        let mut customer = Customer::new(name, now);
        customer.id = "1".into();
        customer.updated_at = updated_secs.map(|s| Utc.timestamp_opt(s, 0).unwrap());
        customer
    }

    #[test]
    fn test_no_local_always_applies() {
        let remote = make_customer("remote", Some(100));
        assert!(should_apply(&remote, None, ConflictPolicy::RemoteWins));
        assert!(should_apply(&remote, None, ConflictPolicy::LatestUpdate));
    }

    #[test]
    fn test_remote_wins_ignores_timestamps() {
        let remote = make_customer("remote", Some(100));
        let local = make_customer("local", Some(200));
        assert!(should_apply(&remote, Some(&local), ConflictPolicy::RemoteWins));
    }

    #[test]
    fn test_newer_local_kept_under_latest_update() {
        let remote = make_customer("remote", Some(100));
        let local = make_customer("local", Some(200));
        assert!(!should_apply(&remote, Some(&local), ConflictPolicy::LatestUpdate));
    }

    #[test]
    fn test_newer_remote_applies_under_latest_update() {
        let remote = make_customer("remote", Some(200));
        let local = make_customer("local", Some(100));
        assert!(should_apply(&remote, Some(&local), ConflictPolicy::LatestUpdate));
    }

    #[test]
    fn test_tie_goes_to_remote() {
        let remote = make_customer("remote", Some(100));
        let local = make_customer("local", Some(100));
        assert!(should_apply(&remote, Some(&local), ConflictPolicy::LatestUpdate));
    }

    #[test]
    fn test_missing_timestamp_goes_to_remote() {
        let remote = make_customer("remote", None);
        let local = make_customer("local", Some(100));
        assert!(should_apply(&remote, Some(&local), ConflictPolicy::LatestUpdate));
    }
}
