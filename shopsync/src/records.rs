//! Tagged record types for every persisted collection.
//!
//! Field names on the wire are camelCase, matching the column names of the
//! remote `customers` and `tasks` tables. Any field a record type does not know
//! about is kept in its `extra` map and written back unchanged, so a value read
//! from the local store or the remote table survives a round trip intact.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::state::AppState;

/// Status id of the terminal kanban column.
pub const DONE_STATUS: &str = "done";

/// The named collections kept in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Customers,
    Tasks,
    KanbanColumns,
    ArchivedTasks,
}

impl Collection {
    /// Key the collection is persisted under in the local store.
    pub fn key(self) -> &'static str {
        match self {
            Collection::Customers => "customers",
            Collection::Tasks => "tasks",
            Collection::KanbanColumns => "kanban_columns",
            Collection::ArchivedTasks => "archived_tasks",
        }
    }

    /// Remote table mirroring this collection, if it participates in sync.
    pub fn remote_table(self) -> Option<&'static str> {
        match self {
            Collection::Customers => Some("customers"),
            Collection::Tasks => Some("tasks"),
            Collection::KanbanColumns | Collection::ArchivedTasks => None,
        }
    }

    pub fn is_syncable(self) -> bool {
        self.remote_table().is_some()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A record stored in one of the [`Collection`]s.
///
/// The `id` is assigned once at creation and is the merge key for the
/// reconciliation pass.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The collection this record type lives in.
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    /// Last field mutation time, if the record carries one.
    fn updated_at(&self) -> Option<DateTime<Utc>>;

    /// Refresh the mutation timestamp. Types without one ignore this.
    fn touch(&mut self, now: DateTime<Utc>);

    fn records(state: &AppState) -> &[Self];

    fn records_mut(state: &mut AppState) -> &mut Vec<Self>;
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Remote tables return `null` for an unset array column.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bikes: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub maintenance_logs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Customer {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            email: None,
            phone: None,
            line_id: None,
            notes: None,
            bikes: Vec::new(),
            maintenance_logs: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
            extra: Map::new(),
        }
    }
}

impl Record for Customer {
    const COLLECTION: Collection = Collection::Customers;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }

    fn records(state: &AppState) -> &[Self] {
        &state.customers
    }

    fn records_mut(state: &mut AppState) -> &mut Vec<Self> {
        &mut state.customers
    }
}

/// A part ordered for a repair task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// A unit of labour logged against a repair task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A repair or order job shown on the kanban board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Id of the kanban column the task sits in.
    pub status: String,
    /// Position within the column; remote fetch order carries no meaning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attachments: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub order_items: Vec<OrderItem>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub work_items: Vec<WorkItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(title: impl Into<String>, status: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            customer_id: None,
            customer_name: None,
            due_date: None,
            priority: None,
            status: status.into(),
            order: None,
            memo: None,
            attachments: Vec::new(),
            order_items: Vec::new(),
            work_items: Vec::new(),
            completed_at: None,
            created_at: Some(now),
            updated_at: Some(now),
            extra: Map::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == DONE_STATUS
    }

    /// Place the task in `status` at position `order`.
    ///
    /// Entering the done column stamps `completed_at` unless it is already set;
    /// leaving it clears the stamp.
    pub fn move_to(&mut self, status: &str, order: i64, now: DateTime<Utc>) {
        self.status = status.to_string();
        self.order = Some(order);
        if self.is_done() {
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
        } else {
            self.completed_at = None;
        }
        self.updated_at = Some(now);
    }
}

impl Record for Task {
    const COLLECTION: Collection = Collection::Tasks;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }

    fn records(state: &AppState) -> &[Self] {
        &state.tasks
    }

    fn records_mut(state: &mut AppState) -> &mut Vec<Self> {
        &mut state.tasks
    }
}

/// A kanban column. Local-only board configuration, never synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanbanColumn {
    pub id: String,
    pub title: String,
    pub color: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl KanbanColumn {
    pub fn new(id: impl Into<String>, title: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            color: color.into(),
            extra: Map::new(),
        }
    }

    /// The board a fresh install starts with.
    pub fn defaults() -> Vec<KanbanColumn> {
        vec![
            KanbanColumn::new("contact", "問い合わせ", "#94a3b8"),
            KanbanColumn::new("todo", "未着手", "#64748b"),
            KanbanColumn::new("inprogress", "作業中", "#4f46e5"),
            KanbanColumn::new("waiting", "部品待ち/連絡待ち", "#f59e0b"),
            KanbanColumn::new(DONE_STATUS, "完了/納品", "#10b981"),
        ]
    }
}

impl Record for KanbanColumn {
    const COLLECTION: Collection = Collection::KanbanColumns;

    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn touch(&mut self, _now: DateTime<Utc>) {}

    fn records(state: &AppState) -> &[Self] {
        &state.kanban_columns
    }

    fn records_mut(state: &mut AppState) -> &mut Vec<Self> {
        &mut state.kanban_columns
    }
}

/// A completed task moved out of the active collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedTask {
    #[serde(flatten)]
    pub task: Task,
    pub archived_at: DateTime<Utc>,
}

impl ArchivedTask {
    pub fn new(task: Task, archived_at: DateTime<Utc>) -> Self {
        Self { task, archived_at }
    }
}

impl Record for ArchivedTask {
    const COLLECTION: Collection = Collection::ArchivedTasks;

    fn id(&self) -> &str {
        &self.task.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.task.updated_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.task.updated_at = Some(now);
    }

    fn records(state: &AppState) -> &[Self] {
        &state.archived_tasks
    }

    fn records_mut(state: &mut AppState) -> &mut Vec<Self> {
        &mut state.archived_tasks
    }
}
