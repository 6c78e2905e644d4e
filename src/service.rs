//! Write path used by every front end.
//!
//! Each operation validates, writes through the repository, then updates the
//! reminder for the affected task and publishes a [`WriteEvent`]. The write
//! and the reminder update are not one transaction: the write commits first,
//! and a refused reminder is reported as [`WriteOutcome::warning`] while the
//! task stays saved.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::events::{EventBus, WriteEvent, WriteKind};
use crate::hierarchy::{depths, descendant_ids, MAX_DEPTH};
use crate::repository::TaskRepository;
use crate::scheduler::{AlarmScheduler, ReminderState};
use crate::task::{validate_for_save, Task};

/// What a write did.
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    /// The task as persisted, or as it was before a delete.
    pub task: Task,
    pub reminder: ReminderState,
    /// Every id removed by a delete, the task itself included.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub event: WriteEvent,
}

#[derive(Clone)]
pub struct TaskService {
    repository: TaskRepository,
    scheduler: Arc<AlarmScheduler>,
    bus: EventBus,
}

impl TaskService {
    pub fn new(repository: TaskRepository, scheduler: Arc<AlarmScheduler>, bus: EventBus) -> Self {
        Self {
            repository,
            scheduler,
            bus,
        }
    }

    pub fn repository(&self) -> &TaskRepository {
        &self.repository
    }

    pub fn scheduler(&self) -> &Arc<AlarmScheduler> {
        &self.scheduler
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Insert a new task (`id == 0`) or overwrite an existing one.
    pub fn upsert(&self, task: Task) -> Result<WriteOutcome> {
        let task = task.normalized();
        let stored = if task.is_saved() {
            Some(
                self.repository
                    .find(task.id)?
                    .ok_or(Error::TaskNotFound(task.id))?,
            )
        } else {
            None
        };

        validate_for_save(&task, stored.as_ref(), self.scheduler.clock().now())?;
        self.check_parent(&task)?;

        let saved = self.repository.upsert_task(&task)?;
        info!(task_id = saved.id, created = stored.is_none(), "task saved");

        let (reminder, warning) = reminder_result(saved.id, self.scheduler.on_upsert(&saved));
        Ok(self.finish(WriteKind::Upserted, saved, reminder, Vec::new(), warning))
    }

    /// Delete a task and its subtree, cancelling their reminders first.
    pub fn delete(&self, id: i64) -> Result<WriteOutcome> {
        let tasks = self.repository.snapshot()?;
        let task = tasks
            .iter()
            .find(|task| task.id == id)
            .cloned()
            .ok_or(Error::TaskNotFound(id))?;

        let mut removed: Vec<i64> = descendant_ids(&tasks, id).into_iter().collect();
        removed.push(id);
        removed.sort_unstable();
        for task_id in &removed {
            self.scheduler.on_delete(*task_id);
        }

        if !self.repository.delete_task(id)? {
            return Err(Error::TaskNotFound(id));
        }
        info!(task_id = id, removed = removed.len(), "task deleted");

        Ok(self.finish(
            WriteKind::Deleted,
            task,
            ReminderState::Unscheduled,
            removed,
            None,
        ))
    }

    /// Flip the completion flag.
    pub fn toggle_completion(&self, id: i64) -> Result<WriteOutcome> {
        let task = self
            .repository
            .find(id)?
            .ok_or(Error::TaskNotFound(id))?;
        let saved = self.repository.upsert_task(&task.toggled())?;
        info!(task_id = id, completed = saved.is_completed, "completion toggled");

        let (reminder, warning) = reminder_result(saved.id, self.scheduler.on_toggle(&saved));
        Ok(self.finish(
            WriteKind::CompletionToggled,
            saved,
            reminder,
            Vec::new(),
            warning,
        ))
    }

    /// Tasks that may become the parent of `id`: everything except the task
    /// itself and its descendants. `None` means a task not saved yet.
    pub fn parent_candidates(&self, id: Option<i64>) -> Result<Vec<Task>> {
        let tasks = self.repository.snapshot()?;
        let Some(id) = id else {
            return Ok(tasks);
        };
        let excluded = descendant_ids(&tasks, id);
        Ok(tasks
            .into_iter()
            .filter(|task| task.id != id && !excluded.contains(&task.id))
            .collect())
    }

    fn check_parent(&self, task: &Task) -> Result<()> {
        let Some(parent_id) = task.parent_id else {
            return Ok(());
        };
        if task.is_saved() && parent_id == task.id {
            return Err(Error::CyclicHierarchy { task_id: task.id });
        }
        if self.repository.find(parent_id)?.is_none() {
            return Err(Error::ParentNotFound(parent_id));
        }

        let tasks = self.repository.snapshot()?;
        let below = if task.is_saved() {
            descendant_ids(&tasks, task.id)
        } else {
            HashSet::new()
        };
        if below.contains(&parent_id) {
            return Err(Error::CyclicHierarchy { task_id: task.id });
        }

        // Levels after the move: the task lands one below its new parent and
        // its subtree keeps its relative shape.
        let levels = depths(&tasks)?;
        let own = levels.get(&task.id).copied().unwrap_or(0);
        let subtree_height = below
            .iter()
            .filter_map(|id| levels.get(id))
            .map(|level| level.saturating_sub(own))
            .max()
            .unwrap_or(0);
        let parent_level = levels.get(&parent_id).copied().unwrap_or(0);
        if parent_level + 1 + subtree_height > MAX_DEPTH {
            return Err(Error::HierarchyTooDeep {
                task_id: task.id,
                max_depth: MAX_DEPTH,
            });
        }
        Ok(())
    }

    fn finish(
        &self,
        kind: WriteKind,
        task: Task,
        reminder: ReminderState,
        removed: Vec<i64>,
        warning: Option<String>,
    ) -> WriteOutcome {
        let event = WriteEvent::new(kind, task.id);
        self.bus.publish(event.clone());
        WriteOutcome {
            task,
            reminder,
            removed,
            warning,
            event,
        }
    }
}

fn reminder_result(task_id: i64, result: Result<ReminderState>) -> (ReminderState, Option<String>) {
    match result {
        Ok(state) => (state, None),
        Err(err) => {
            warn!(task_id, error = %err, "task saved without a reminder");
            (ReminderState::Unscheduled, Some(err.to_string()))
        }
    }
}
