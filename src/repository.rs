//! Task repository.
//!
//! Thin seam between the store and everything above it. Each method maps to
//! one store operation; reads come back as live queries so callers stay in
//! sync without polling.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::live::LiveQuery;
use crate::store::TaskStore;
use crate::task::Task;

#[derive(Clone)]
pub struct TaskRepository {
    store: Arc<dyn TaskStore>,
    grace: Duration,
    tasks: LiveQuery<Vec<Task>>,
}

impl TaskRepository {
    pub fn new(store: Arc<dyn TaskStore>, grace: Duration) -> Self {
        let tasks = LiveQuery::new("tasks", Arc::clone(&store), grace, |store| store.tasks());
        Self {
            store,
            grace,
            tasks,
        }
    }

    /// The ordered task list, shared by every subscriber.
    pub fn tasks(&self) -> LiveQuery<Vec<Task>> {
        self.tasks.clone()
    }

    /// One task by id; `None` while it does not exist.
    pub fn task_by_id(&self, id: i64) -> LiveQuery<Option<Task>> {
        LiveQuery::new("task_by_id", Arc::clone(&self.store), self.grace, move |store| {
            store.task(id)
        })
    }

    pub fn snapshot(&self) -> Result<Vec<Task>> {
        self.store.tasks()
    }

    pub fn find(&self, id: i64) -> Result<Option<Task>> {
        self.store.task(id)
    }

    pub fn upsert_task(&self, task: &Task) -> Result<Task> {
        self.store.upsert(task)
    }

    pub fn delete_task(&self, id: i64) -> Result<bool> {
        self.store.delete(id)
    }

    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    pub fn grace_period(&self) -> Duration {
        self.grace
    }
}
