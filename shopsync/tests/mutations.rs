mod common;

use std::sync::Arc;

use chrono::TimeDelta;
use shopsync::records::{Customer, DONE_STATUS, KanbanColumn, Task};
use shopsync::{
    Collection, ColumnRemoval, MutationOutcome, Notice, ShopSyncBuilder, SyncSettings,
};

use common::{FakeRemote, app_with, app_with_settings, now};

#[tokio::test]
async fn test_mutation_saves_locally_and_mirrors() {
    let remote = FakeRemote::signed_in();
    let mut app = app_with(remote.clone()).await;

    let customer = Customer::new("Suzuki", now() - TimeDelta::hours(1));
    let outcome = app.record_mutated(customer.clone(), now()).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Mirrored);
    assert_eq!(app.state().customers[0].updated_at, Some(now()));
    let stored: Vec<Customer> = app.store().get(Collection::Customers).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(remote.row_ids("customers"), vec![customer.id.clone()]);
    assert_eq!(remote.upserts(), vec![("customers".to_string(), 1)]);
}

#[tokio::test]
async fn test_edit_replaces_record_by_id() {
    let mut app = app_with(FakeRemote::inactive()).await;
    let mut customer = Customer::new("Suzuki", now());
    app.record_mutated(customer.clone(), now()).await.unwrap();

    customer.phone = Some("090-0000-0000".into());
    let outcome = app.record_mutated(customer.clone(), now()).await.unwrap();

    assert_eq!(outcome, MutationOutcome::LocalOnly);
    assert_eq!(app.state().customers.len(), 1);
    assert_eq!(app.state().customers[0].phone.as_deref(), Some("090-0000-0000"));
}

#[tokio::test]
async fn test_mirror_failure_keeps_local_write() {
    let remote = FakeRemote::signed_in();
    let mut app = app_with(remote.clone()).await;
    remote.fail_upserts(true);
    let mut notices = app.subscribe();

    let outcome = app
        .record_mutated(Task::new("Wheel true", "todo", now()), now())
        .await
        .unwrap();

    assert!(matches!(outcome, MutationOutcome::MirrorFailed { .. }));
    assert!(matches!(
        notices.try_recv().unwrap(),
        Notice::MirrorFailed { collection: Collection::Tasks, .. }
    ));
    let stored: Vec<Task> = app.store().get(Collection::Tasks).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_delete_is_local_first_even_when_remote_fails() {
    let remote = FakeRemote::signed_in();
    let mut app = app_with(remote.clone()).await;
    let customer = Customer::new("Suzuki", now());
    app.record_mutated(customer.clone(), now()).await.unwrap();
    remote.fail_deletes(true);

    let outcome = app.record_deleted(Collection::Customers, &customer.id).await.unwrap();

    assert!(matches!(outcome, MutationOutcome::MirrorFailed { .. }));
    assert!(app.state().customers.is_empty());
    let stored: Vec<Customer> = app.store().get(Collection::Customers).await.unwrap();
    assert!(stored.is_empty());
    // remote copy is stale, not rolled back into local
    assert_eq!(remote.row_ids("customers"), vec![customer.id.clone()]);
}

#[tokio::test]
async fn test_delete_requests_remote_delete_by_id() {
    let remote = FakeRemote::signed_in();
    let mut app = app_with(remote.clone()).await;
    let task = Task::new("Chain swap", "todo", now());
    app.record_mutated(task.clone(), now()).await.unwrap();

    let outcome = app.record_deleted(Collection::Tasks, &task.id).await.unwrap();

    assert_eq!(outcome, MutationOutcome::Mirrored);
    assert_eq!(remote.deletes(), vec![("tasks".to_string(), task.id.clone())]);
    assert!(remote.row_ids("tasks").is_empty());
}

#[tokio::test]
async fn test_capacity_exceeded_aborts_save_and_keeps_state() {
    let remote = FakeRemote::signed_in();
    let settings = SyncSettings {
        storage_quota_bytes: 2_000,
        storage_warn_bytes: 1_500,
        ..SyncSettings::default()
    };
    let mut app = app_with_settings(remote.clone(), settings).await;
    app.record_mutated(Customer::new("Small", now()), now()).await.unwrap();

    let mut big = Customer::new("Big", now());
    big.notes = Some("x".repeat(4_000));
    let err = app.record_mutated(big, now()).await.unwrap_err();

    assert!(err.is_capacity_exceeded());
    assert_eq!(app.state().customers.len(), 1);
    let stored: Vec<Customer> = app.store().get(Collection::Customers).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(remote.row_ids("customers").len(), 1);
}

#[tokio::test]
async fn test_large_save_raises_storage_notice() {
    let settings = SyncSettings {
        storage_warn_bytes: 100,
        ..SyncSettings::default()
    };
    let mut app = app_with_settings(FakeRemote::inactive(), settings).await;
    let mut notices = app.subscribe();

    let mut customer = Customer::new("Verbose", now());
    customer.notes = Some("y".repeat(500));
    app.record_mutated(customer, now()).await.unwrap();

    assert!(matches!(
        notices.try_recv().unwrap(),
        Notice::StorageNearlyFull { ref key, .. } if key == "customers"
    ));
}

#[tokio::test]
async fn test_kanban_move_and_reorder() {
    let remote = FakeRemote::signed_in();
    let mut app = app_with(remote.clone()).await;
    let a = Task::new("A", "todo", now());
    let b = Task::new("B", "inprogress", now());
    app.record_mutated(a.clone(), now()).await.unwrap();
    app.record_mutated(b.clone(), now()).await.unwrap();

    let outcome = app
        .reorder_column(DONE_STATUS, &[b.id.clone(), a.id.clone()], now())
        .await
        .unwrap();
    assert_eq!(outcome, MutationOutcome::Mirrored);

    let done: Vec<&str> = app
        .state()
        .tasks_in_column(DONE_STATUS)
        .into_iter()
        .map(|t| t.title.as_str())
        .collect();
    assert_eq!(done, vec!["B", "A"]);
    assert!(app.state().tasks.iter().all(|t| t.completed_at == Some(now())));

    let later = now() + TimeDelta::hours(1);
    app.move_task(&a.id, "todo", 0, later).await.unwrap();
    let moved = app.state().tasks.iter().find(|t| t.id == a.id).unwrap();
    assert!(moved.completed_at.is_none());
    assert!(app.move_task("missing", "todo", 0, later).await.unwrap().is_none());
}

#[tokio::test]
async fn test_column_removal_refused_while_in_use() {
    let mut app = app_with(FakeRemote::inactive()).await;
    assert_eq!(app.state().kanban_columns, KanbanColumn::defaults());

    app.record_mutated(Task::new("Waiting on parts", "waiting", now()), now())
        .await
        .unwrap();
    assert_eq!(
        app.remove_column("waiting").await.unwrap(),
        ColumnRemoval::InUse { tasks: 1 }
    );
    assert_eq!(app.remove_column("contact").await.unwrap(), ColumnRemoval::Removed);
    assert_eq!(app.remove_column("nope").await.unwrap(), ColumnRemoval::NotFound);

    let outcome = app
        .add_column(KanbanColumn::new("pickup", "Ready for pickup", "#0ea5e9"))
        .await
        .unwrap();
    assert_eq!(outcome, MutationOutcome::LocalOnly);
    let ids: Vec<&str> = app.state().kanban_columns.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["todo", "inprogress", "waiting", "done", "pickup"]);
}

#[tokio::test]
async fn test_sign_in_persists_session_across_restart() {
    let db = std::env::temp_dir().join(format!("shopsync-session-{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}?mode=rwc", db.display());

    let remote = FakeRemote::signed_out();
    let app = ShopSyncBuilder::new(&url)
        .with_remote(remote.clone())
        .build()
        .await
        .unwrap();
    assert!(app.sign_in("owner@example.com", "wrong").await.is_err());
    let session = app.sign_in("owner@example.com", "secret").await.unwrap();
    drop(app);

    let fresh = FakeRemote::signed_out();
    let reopened = ShopSyncBuilder::new(&url)
        .with_remote(fresh.clone() as Arc<dyn shopsync::RemoteTableClient>)
        .build()
        .await
        .unwrap();
    assert_eq!(reopened.session().await, Some(session));

    reopened.sign_out().await.unwrap();
    assert!(reopened.session().await.is_none());
    let _ = std::fs::remove_file(db);
}
