use sea_orm::DbErr;
use thiserror::Error;

/// Failures of the local record store.
///
/// Only [`StoreError::CapacityExceeded`] is expected in normal operation; it
/// aborts the save that triggered it and must be shown to the user.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Local database error: {0}")]
    Database(#[from] DbErr),

    #[error("Stored value could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(
        "Local storage is full: saving `{key}` needs {required} bytes but only {quota} are available. Delete unused images or export a backup before continuing."
    )]
    CapacityExceeded {
        key: String,
        required: u64,
        quota: u64,
    },
}

impl StoreError {
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, StoreError::CapacityExceeded { .. })
    }
}

/// Failures talking to the remote table store.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Cloud sync is not configured")]
    Inactive,

    #[error("Not signed in to the cloud")]
    Unauthenticated,

    #[error("Request to the cloud failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cloud returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected response from the cloud: {0}")]
    Malformed(String),

    #[error("Could not encode records for upload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures reading a backup snapshot.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Backup file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Backup file has no `{0}` collection")]
    MissingCollection(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}
