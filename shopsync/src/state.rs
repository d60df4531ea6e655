use crate::error::StoreError;
use crate::local_store::LocalStore;
use crate::records::{ArchivedTask, Collection, Customer, KanbanColumn, Task};

/// In-memory copy of every collection.
///
/// Owned by [`ShopSync`](crate::ShopSync); view code reads it through
/// [`ShopSync::state`](crate::ShopSync::state) and mutates only through the
/// controller so every write reaches the local store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub customers: Vec<Customer>,
    pub tasks: Vec<Task>,
    pub kanban_columns: Vec<KanbanColumn>,
    pub archived_tasks: Vec<ArchivedTask>,
}

impl AppState {
    /// Read all four collections from the local store.
    pub async fn load(store: &LocalStore) -> Result<Self, StoreError> {
        Ok(Self {
            customers: store.get(Collection::Customers).await?,
            tasks: store.get(Collection::Tasks).await?,
            kanban_columns: store.get(Collection::KanbanColumns).await?,
            archived_tasks: store.get(Collection::ArchivedTasks).await?,
        })
    }

    /// Active tasks sitting in `status`, in their explicit column order.
    pub fn tasks_in_column(&self, status: &str) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().filter(|t| t.status == status).collect();
        tasks.sort_by_key(|t| t.order.unwrap_or(0));
        tasks
    }
}
