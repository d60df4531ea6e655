//! The application controller.
//!
//! [`ShopSync`] owns the in-memory [`AppState`], the [`LocalStore`] and the
//! optional remote client. Every mutation goes through it: the local write
//! happens first and decides success, the remote mirror afterwards is reported
//! as a [`MutationOutcome`] and, on failure, as a [`Notice`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::archive;
use crate::config::{CloudConfig, RestorePolicy, SyncSettings};
use crate::error::{RemoteError, StoreError};
use crate::local_store::{LocalStore, SESSION_KEY};
use crate::messages::{
    CollectionStatus, CollectionSync, MutationOutcome, Notice, PushOutcome, SkipReason, SyncReport,
};
use crate::reconcile::{Checkpoint, reconcile};
use crate::records::{ArchivedTask, Collection, Customer, KanbanColumn, Record, Task};
use crate::remote::{RemoteTableClient, Session, encode_rows, fetch_collection};
use crate::state::AppState;
use crate::supabase::SupabaseClient;

const NOTICE_CAPACITY: usize = 64;

/// Result of [`ShopSync::remove_column`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRemoval {
    Removed,
    /// Active tasks still sit in the column.
    InUse { tasks: usize },
    NotFound,
}

pub struct ShopSync {
    store: LocalStore,
    remote: Option<Arc<dyn RemoteTableClient>>,
    settings: SyncSettings,
    state: AppState,
    notice_tx: broadcast::Sender<Notice>,
}

impl ShopSync {
    pub fn builder(database_url: &str) -> ShopSyncBuilder {
        ShopSyncBuilder::new(database_url)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Receive notices raised from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    pub fn is_cloud_active(&self) -> bool {
        self.active_remote().is_some()
    }

    fn active_remote(&self) -> Option<Arc<dyn RemoteTableClient>> {
        self.remote.as_ref().filter(|r| r.is_active()).cloned()
    }

    fn notify(&self, notice: Notice) {
        log::debug!("Notice: {notice}");
        // no subscribers is fine
        let _ = self.notice_tx.send(notice);
    }

    // --- Sync passes ---

    /// Archive aged done tasks, then reconcile customers and tasks when cloud
    /// sync is active and a session exists. Fetch failures are only logged.
    pub async fn startup_sync(&mut self, now: DateTime<Utc>) -> Result<SyncReport, StoreError> {
        let archived = self.archive_completed(now).await?;
        let mut report = self.reconcile_all(now, false).await?;
        report.archived = archived;
        Ok(report)
    }

    /// User-requested reconciliation. Unlike the startup pass, a collection
    /// that cannot be fetched raises [`Notice::RemoteUnavailable`].
    pub async fn sync_now(&mut self, now: DateTime<Utc>) -> Result<SyncReport, StoreError> {
        self.reconcile_all(now, true).await
    }

    /// Move done tasks older than the retention window into the archive.
    /// Returns how many were moved.
    pub async fn archive_completed(&mut self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let swept = archive::sweep(self.state.tasks.clone(), now, self.settings.archive_after);
        let count = swept.archived.len();
        if count == 0 {
            return Ok(0);
        }

        let mut archived = self.state.archived_tasks.clone();
        archived.extend(swept.archived);
        // archive first: a failure in between leaves a duplicate, never a loss
        self.persist(archived).await?;
        self.persist(swept.active).await?;

        log::info!("Archived {count} completed tasks");
        self.notify(Notice::TasksArchived { count });
        Ok(count)
    }

    async fn reconcile_all(
        &mut self,
        now: DateTime<Utc>,
        surface_failures: bool,
    ) -> Result<SyncReport, StoreError> {
        let Some(remote) = self.active_remote() else {
            log::info!("Cloud sync inactive, using local data only");
            return Ok(SyncReport::skipped(SkipReason::CloudInactive));
        };
        if remote.get_session().await.is_none() {
            log::info!("No cloud session, skipping reconciliation");
            return Ok(SyncReport::skipped(SkipReason::SignedOut));
        }

        let mut report = SyncReport::default();
        let customers = self
            .reconcile_collection::<Customer>(remote.as_ref(), &HashSet::new(), now, surface_failures)
            .await?;
        report.collections.push(customers);

        // archived tasks may still have rows remotely; they must not come back as active
        let archived_ids: HashSet<String> = self
            .state
            .archived_tasks
            .iter()
            .map(|t| t.task.id.clone())
            .collect();
        let tasks = self
            .reconcile_collection::<Task>(remote.as_ref(), &archived_ids, now, surface_failures)
            .await?;
        report.collections.push(tasks);
        Ok(report)
    }

    /// Fetch, merge, persist locally, push back, then stamp the checkpoint.
    async fn reconcile_collection<R: Record>(
        &mut self,
        remote: &dyn RemoteTableClient,
        skip_ids: &HashSet<String>,
        now: DateTime<Utc>,
        surface_failures: bool,
    ) -> Result<CollectionSync, StoreError> {
        let collection = R::COLLECTION;
        let unavailable = CollectionSync {
            collection,
            status: CollectionStatus::RemoteUnavailable,
        };
        let Some(table) = collection.remote_table() else {
            return Ok(unavailable);
        };

        let Some(mut fetched) = fetch_collection::<R>(remote, table).await else {
            log::warn!("{collection}: remote unavailable, keeping local data");
            if surface_failures {
                self.notify(Notice::RemoteUnavailable { collection });
            }
            return Ok(unavailable);
        };
        if !skip_ids.is_empty() {
            let before = fetched.len();
            fetched.retain(|r| !skip_ids.contains(r.id()));
            if fetched.len() != before {
                log::debug!(
                    "{collection}: ignoring {} remote rows already archived",
                    before - fetched.len()
                );
            }
        }

        let last_sync = self.store.last_sync().await?;
        let local = R::records(&self.state).to_vec();
        let outcome = reconcile(local, Some(fetched), last_sync, self.settings.conflict_policy);
        let records = outcome.merged.len();
        self.persist(outcome.merged).await?;

        let push = if !outcome.push_needed {
            PushOutcome::NotNeeded
        } else if outcome.restore && self.settings.restore_policy == RestorePolicy::RequireConfirmation {
            log::warn!("{collection}: remote table is empty, waiting for confirmation before restoring");
            self.notify(Notice::RestorePending {
                collection,
                local_records: records,
            });
            PushOutcome::Deferred
        } else {
            self.push_collection::<R>(remote, table).await
        };

        // merge and push already happened; a failed stamp must not hide them
        let checkpoint_saved = match self.store.set_last_sync(Checkpoint::from(now)).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("{collection}: merged, but the sync checkpoint was not saved: {e}");
                false
            }
        };

        Ok(CollectionSync {
            collection,
            status: CollectionStatus::Merged {
                records,
                local_only: outcome.local_only.len(),
                restore: outcome.restore,
                push,
                checkpoint_saved,
            },
        })
    }

    async fn push_collection<R: Record>(&self, remote: &dyn RemoteTableClient, table: &str) -> PushOutcome {
        let collection = R::COLLECTION;
        let records = R::records(&self.state);
        match upsert_records(remote, table, records).await {
            Ok(()) => {
                log::info!("{collection}: pushed {} records to the cloud", records.len());
                PushOutcome::Pushed {
                    records: records.len(),
                }
            }
            Err(e) => {
                let reason = e.to_string();
                log::error!("{collection}: cloud push failed: {reason}");
                self.notify(Notice::PushFailed {
                    collection,
                    reason: reason.clone(),
                });
                PushOutcome::Failed { reason }
            }
        }
    }

    /// Upload both syncable collections in full, whatever the remote holds.
    pub async fn push_local_to_cloud(&self) -> Result<Vec<(Collection, PushOutcome)>, RemoteError> {
        let remote = self.active_remote().ok_or(RemoteError::Inactive)?;
        let mut outcomes = Vec::with_capacity(2);

        let customers = if self.state.customers.is_empty() {
            PushOutcome::NotNeeded
        } else {
            self.push_collection::<Customer>(remote.as_ref(), "customers").await
        };
        outcomes.push((Collection::Customers, customers));

        let tasks = if self.state.tasks.is_empty() {
            PushOutcome::NotNeeded
        } else {
            self.push_collection::<Task>(remote.as_ref(), "tasks").await
        };
        outcomes.push((Collection::Tasks, tasks));
        Ok(outcomes)
    }

    // --- Mutations ---

    /// Save a created or edited record: refresh `updatedAt`, replace by id or
    /// append, write the collection locally, then mirror it remotely.
    ///
    /// Only a local store failure returns `Err`; the in-memory state is left
    /// untouched in that case.
    pub async fn record_mutated<R: Record>(
        &mut self,
        mut record: R,
        now: DateTime<Utc>,
    ) -> Result<MutationOutcome, StoreError> {
        record.touch(now);
        let mut records = R::records(&self.state).to_vec();
        match records.iter_mut().find(|r| r.id() == record.id()) {
            Some(slot) => *slot = record,
            None => records.push(record),
        }
        self.persist(records).await?;
        Ok(self.mirror::<R>().await)
    }

    /// Overwrite a whole collection, as a backup import does.
    pub async fn replace_collection<R: Record>(&mut self, records: Vec<R>) -> Result<MutationOutcome, StoreError> {
        self.persist(records).await?;
        Ok(self.mirror::<R>().await)
    }

    /// Remove a record locally, unconditionally, then request the remote delete.
    pub async fn record_deleted(&mut self, collection: Collection, id: &str) -> Result<MutationOutcome, StoreError> {
        match collection {
            Collection::Customers => self.remove::<Customer>(id).await,
            Collection::Tasks => self.remove::<Task>(id).await,
            Collection::KanbanColumns => self.remove::<KanbanColumn>(id).await,
            Collection::ArchivedTasks => self.remove::<ArchivedTask>(id).await,
        }
    }

    async fn remove<R: Record>(&mut self, id: &str) -> Result<MutationOutcome, StoreError> {
        let collection = R::COLLECTION;
        let mut records = R::records(&self.state).to_vec();
        let before = records.len();
        records.retain(|r| r.id() != id);
        if records.len() == before {
            log::debug!("{collection}: delete of unknown id {id}");
        } else {
            self.persist(records).await?;
        }

        let (Some(table), Some(remote)) = (collection.remote_table(), self.active_remote()) else {
            return Ok(MutationOutcome::LocalOnly);
        };
        match remote.delete_by_id(table, id).await {
            Ok(()) => Ok(MutationOutcome::Mirrored),
            Err(e) => {
                let reason = e.to_string();
                log::error!("{collection}: cloud delete of {id} failed: {reason}");
                self.notify(Notice::DeleteFailed {
                    collection,
                    id: id.to_string(),
                    reason: reason.clone(),
                });
                Ok(MutationOutcome::MirrorFailed { reason })
            }
        }
    }

    /// Write `records` locally, then adopt them in memory.
    async fn persist<R: Record>(&mut self, records: Vec<R>) -> Result<(), StoreError> {
        let report = self.store.save(R::COLLECTION, &records).await?;
        if report.near_capacity {
            self.notify(Notice::StorageNearlyFull {
                key: R::COLLECTION.key().to_string(),
                bytes: report.bytes,
            });
        }
        *R::records_mut(&mut self.state) = records;
        Ok(())
    }

    async fn mirror<R: Record>(&self) -> MutationOutcome {
        let collection = R::COLLECTION;
        let (Some(table), Some(remote)) = (collection.remote_table(), self.active_remote()) else {
            return MutationOutcome::LocalOnly;
        };
        match upsert_records(remote.as_ref(), table, R::records(&self.state)).await {
            Ok(()) => MutationOutcome::Mirrored,
            Err(e) => {
                let reason = e.to_string();
                log::error!("{collection}: cloud mirror failed: {reason}");
                self.notify(Notice::MirrorFailed {
                    collection,
                    reason: reason.clone(),
                });
                MutationOutcome::MirrorFailed { reason }
            }
        }
    }

    // --- Kanban ---

    /// Move one task to `status` at position `order`. `None` if no such task.
    pub async fn move_task(
        &mut self,
        id: &str,
        status: &str,
        order: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<MutationOutcome>, StoreError> {
        let Some(mut task) = self.state.tasks.iter().find(|t| t.id == id).cloned() else {
            return Ok(None);
        };
        task.move_to(status, order, now);
        self.record_mutated(task, now).await.map(Some)
    }

    /// Apply a kanban drop: every id in `ordered_ids` lands in `status` with
    /// its index as `order`. Unknown ids are skipped.
    pub async fn reorder_column(
        &mut self,
        status: &str,
        ordered_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<MutationOutcome, StoreError> {
        let mut tasks = self.state.tasks.clone();
        for (index, id) in ordered_ids.iter().enumerate() {
            if let Some(task) = tasks.iter_mut().find(|t| &t.id == id) {
                task.move_to(status, index as i64, now);
            }
        }
        self.persist(tasks).await?;
        Ok(self.mirror::<Task>().await)
    }

    pub async fn add_column(&mut self, column: KanbanColumn) -> Result<MutationOutcome, StoreError> {
        self.record_mutated(column, Utc::now()).await
    }

    /// Delete a column unless active tasks still use it.
    pub async fn remove_column(&mut self, id: &str) -> Result<ColumnRemoval, StoreError> {
        if !self.state.kanban_columns.iter().any(|c| c.id == id) {
            return Ok(ColumnRemoval::NotFound);
        }
        let in_use = self.state.tasks.iter().filter(|t| t.status == id).count();
        if in_use > 0 {
            return Ok(ColumnRemoval::InUse { tasks: in_use });
        }
        self.remove::<KanbanColumn>(id).await?;
        Ok(ColumnRemoval::Removed)
    }

    // --- Account & configuration ---

    /// Sign in and persist the session so the next start stays signed in.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, RemoteError> {
        let remote = self.active_remote().ok_or(RemoteError::Inactive)?;
        let session = remote.sign_in_with_password(email, password).await?;
        if let Err(e) = self.store.put_value(SESSION_KEY, &session).await {
            log::warn!("Signed in, but the session could not be saved locally: {e}");
        }
        Ok(session)
    }

    pub async fn sign_out(&self) -> Result<(), RemoteError> {
        if let Err(e) = self.store.remove_value(SESSION_KEY).await {
            log::warn!("Could not clear the saved session: {e}");
        }
        match &self.remote {
            Some(remote) => remote.sign_out().await,
            None => Ok(()),
        }
    }

    pub async fn session(&self) -> Option<Session> {
        match &self.remote {
            Some(remote) => remote.get_session().await,
            None => None,
        }
    }

    /// Probe the customers table with the current credentials.
    pub async fn test_connection(&self) -> Result<(), RemoteError> {
        let remote = self.active_remote().ok_or(RemoteError::Inactive)?;
        let table = Collection::Customers.remote_table().unwrap_or("customers");
        remote.probe(table).await
    }

    /// Store new cloud credentials and switch to a client using them.
    /// The previous session belongs to the old endpoint and is dropped.
    pub async fn save_cloud_config(&mut self, config: CloudConfig) -> Result<(), StoreError> {
        config.save(&self.store).await?;
        self.store.remove_value(SESSION_KEY).await?;
        self.remote = if config.is_configured() {
            log::info!("Cloud sync configured for {}", config.url);
            Some(Arc::new(SupabaseClient::new(config)))
        } else {
            log::info!("Cloud sync disabled");
            None
        };
        Ok(())
    }
}

async fn upsert_records<R: Record>(
    remote: &dyn RemoteTableClient,
    table: &str,
    records: &[R],
) -> Result<(), RemoteError> {
    let rows = encode_rows(records)?;
    remote.upsert(table, &rows).await
}

/// Builder for [`ShopSync`].
pub struct ShopSyncBuilder {
    database_url: String,
    remote: Option<Arc<dyn RemoteTableClient>>,
    cloud_config: Option<CloudConfig>,
    settings: SyncSettings,
}

impl ShopSyncBuilder {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            remote: None,
            cloud_config: None,
            settings: SyncSettings::default(),
        }
    }

    /// Use this client instead of building a [`SupabaseClient`].
    pub fn with_remote(mut self, remote: Arc<dyn RemoteTableClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Credentials taking precedence over the stored and environment config.
    pub fn with_cloud_config(mut self, config: CloudConfig) -> Self {
        self.cloud_config = Some(config);
        self
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub async fn build(self) -> Result<ShopSync, StoreError> {
        let store = LocalStore::open(&self.database_url)
            .await?
            .with_limits(self.settings.storage_quota_bytes, self.settings.storage_warn_bytes);

        let remote = match self.remote {
            Some(remote) => Some(remote),
            None => {
                let config = match self.cloud_config.filter(CloudConfig::is_configured) {
                    Some(config) => Some(config),
                    None => CloudConfig::resolve(&store).await?,
                };
                config.map(|c| Arc::new(SupabaseClient::new(c)) as Arc<dyn RemoteTableClient>)
            }
        };

        if let Some(remote) = &remote {
            match store.get_value::<Session>(SESSION_KEY).await {
                Ok(Some(session)) if !session.is_expired(Utc::now()) => remote.restore_session(session),
                Ok(Some(_)) => log::info!("Saved session has expired, sign in again"),
                Ok(None) => {}
                Err(e) => log::warn!("Ignoring unreadable saved session: {e}"),
            }
        }

        let mut state = AppState::load(&store).await?;
        if state.kanban_columns.is_empty() {
            state.kanban_columns = KanbanColumn::defaults();
            store.save(Collection::KanbanColumns, &state.kanban_columns).await?;
        }

        let (notice_tx, _) = broadcast::channel::<Notice>(NOTICE_CAPACITY);
        log::info!(
            "Loaded {} customers, {} tasks, {} archived tasks (cloud {})",
            state.customers.len(),
            state.tasks.len(),
            state.archived_tasks.len(),
            if remote.as_ref().is_some_and(|r| r.is_active()) { "active" } else { "inactive" }
        );

        Ok(ShopSync {
            store,
            remote,
            settings: self.settings,
            state,
            notice_tx,
        })
    }
}
