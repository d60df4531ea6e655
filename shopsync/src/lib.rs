//! # ShopSync
//!
//! Local-first record keeping for a small repair shop: customers, repair and
//! order tasks, and the kanban board they sit on.
//!
//! Data lives in an on-device SQLite store and is opportunistically mirrored to
//! a remote table store (Supabase). On start, [`ShopSync::startup_sync`] archives
//! aged completed tasks and then reconciles the local and remote copies of the
//! customer and task collections. A record that exists only locally is never
//! dropped by a sync pass.
//!
//! ## Quick start
//!
//! ```ignore
//! use chrono::Utc;
//! use shopsync::{ShopSyncBuilder, records::Customer};
//!
//! let mut app = ShopSyncBuilder::new("sqlite://shop.db?mode=rwc").build().await?;
//! let report = app.startup_sync(Utc::now()).await?;
//!
//! let customer = Customer::new("Sato", Utc::now());
//! let outcome = app.record_mutated(customer, Utc::now()).await?;
//! ```
//!
//! ## Key types
//!
//! - [`ShopSync`] controller owning the in-memory [`AppState`]
//! - [`LocalStore`] key/value persistence with a capacity quota
//! - [`RemoteTableClient`] remote surface, implemented by [`SupabaseClient`]
//! - [`reconcile()`] the pure local/remote merge
//! - [`Notice`] side-channel notifications for the UI

pub mod archive;
pub mod backup;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod local_store;
pub mod messages;
pub mod reconcile;
pub mod records;
pub mod remote;
pub mod state;
pub mod supabase;

pub use backup::{Backup, Imported, parse_backup};
pub use config::{CloudConfig, RestorePolicy, SyncSettings};
pub use conflict::ConflictPolicy;
pub use engine::{ColumnRemoval, ShopSync, ShopSyncBuilder};
pub use error::{BackupError, RemoteError, StoreError};
pub use local_store::LocalStore;
pub use messages::{
    CollectionStatus, CollectionSync, MutationOutcome, Notice, PushOutcome, SkipReason, SyncReport,
};
pub use reconcile::{Checkpoint, Reconciled, reconcile};
pub use records::{Collection, Record};
pub use remote::{RemoteTableClient, Session};
pub use state::AppState;
pub use supabase::SupabaseClient;
