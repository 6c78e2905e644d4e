//! Durable task storage.
//!
//! [`TaskStore`] is the contract the rest of the crate relies on: upsert by
//! identity, delete by identity, the ordered list query, the by-id query and
//! a change feed that fires after every committed write. [`SqliteTaskStore`]
//! is the shipped implementation, a single `tasks` table in a local SQLite
//! file.
//!
//! # Ordering
//!
//! `tasks()` returns dated tasks first by ascending due date, undated tasks
//! last, ties broken by priority (high first) and then by id.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{Error, Result};
use crate::task::{from_millis, Priority, Task};

/// Current schema version stamped into `schema_meta`.
pub const SCHEMA_VERSION: u32 = 1;

/// Capacity of the change feed; slow subscribers observe `Lagged` and re-query.
const CHANGE_FEED_CAPACITY: usize = 64;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    title        TEXT NOT NULL,
    description  TEXT,
    due_date     INTEGER,            -- epoch milliseconds
    priority     INTEGER NOT NULL,   -- 0 low, 1 medium, 2 high
    is_completed INTEGER NOT NULL DEFAULT 0,
    is_recurring INTEGER NOT NULL DEFAULT 0,
    parent_id    INTEGER REFERENCES tasks(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);
CREATE INDEX IF NOT EXISTS idx_tasks_due    ON tasks(due_date);
"#;

const SELECT_COLUMNS: &str = "SELECT id, title, description, due_date, priority, is_completed, \
     is_recurring, parent_id FROM tasks";

/// Change published after a write commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Upserted(i64),
    Deleted(i64),
}

/// Storage contract for tasks.
pub trait TaskStore: Send + Sync {
    /// Insert when the task is unsaved or unknown, otherwise overwrite every
    /// field. Returns the persisted row.
    fn upsert(&self, task: &Task) -> Result<Task>;

    /// Remove a task (and, through the cascade, its descendants).
    fn delete(&self, id: i64) -> Result<bool>;

    /// All tasks in list order.
    fn tasks(&self) -> Result<Vec<Task>>;

    /// One task, or `None` when the id is unknown.
    fn task(&self, id: i64) -> Result<Option<Task>>;

    /// Feed of committed changes.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// SQLite-backed task store.
///
/// All statements run under one `Mutex<Connection>`; there is a single writer.
pub struct SqliteTaskStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        apply_schema(&conn)?;
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        debug!(path = ?path, "task store opened");
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            changes,
        })
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Schema version recorded in the database.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|raw| raw.parse().ok()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::OperationFailed("task store lock poisoned".to_string()))
    }

    fn publish(&self, change: StoreChange) {
        // No subscribers is not an error.
        let _ = self.changes.send(change);
    }
}

impl TaskStore for SqliteTaskStore {
    fn upsert(&self, task: &Task) -> Result<Task> {
        let conn = self.lock()?;
        let due = task.due_millis();
        let result = if task.is_saved() {
            conn.execute(
                "INSERT INTO tasks (id, title, description, due_date, priority, is_completed, \
                 is_recurring, parent_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(id) DO UPDATE SET title = excluded.title, \
                 description = excluded.description, due_date = excluded.due_date, \
                 priority = excluded.priority, is_completed = excluded.is_completed, \
                 is_recurring = excluded.is_recurring, parent_id = excluded.parent_id",
                params![
                    task.id,
                    task.title,
                    task.description,
                    due,
                    task.priority.rank(),
                    task.is_completed,
                    task.is_recurring,
                    task.parent_id,
                ],
            )
            .map(|_| task.id)
        } else {
            conn.execute(
                "INSERT INTO tasks (title, description, due_date, priority, is_completed, \
                 is_recurring, parent_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    task.title,
                    task.description,
                    due,
                    task.priority.rank(),
                    task.is_completed,
                    task.is_recurring,
                    task.parent_id,
                ],
            )
            .map(|_| conn.last_insert_rowid())
        };

        let id = result.map_err(|err| match (task.parent_id, is_foreign_key_violation(&err)) {
            (Some(parent_id), true) => Error::ParentNotFound(parent_id),
            _ => Error::Sqlite(err),
        })?;
        drop(conn);

        let mut stored = task.clone();
        stored.id = id;
        debug!(task_id = id, "task upserted");
        self.publish(StoreChange::Upserted(id));
        Ok(stored)
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        drop(conn);

        if removed == 0 {
            return Ok(false);
        }
        debug!(task_id = id, "task deleted");
        self.publish(StoreChange::Deleted(id));
        Ok(true)
    }

    fn tasks(&self) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let sql = format!(
            "{SELECT_COLUMNS} ORDER BY due_date IS NULL, due_date ASC, priority DESC, id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_task)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    fn task(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let task = conn.query_row(&sql, params![id], row_to_task).optional()?;
        Ok(task)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

/// Apply the schema; safe to call on every open.
fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let due: Option<i64> = row.get(3)?;
    let priority: i64 = row.get(4)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        due_date: due.and_then(from_millis),
        priority: Priority::from_rank(priority).unwrap_or_default(),
        is_completed: row.get(5)?,
        is_recurring: row.get(6)?,
        parent_id: row.get(7)?,
    })
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _)
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn base() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap()
    }

    fn ids(tasks: &[Task]) -> Vec<i64> {
        tasks.iter().map(|task| task.id).collect()
    }

    #[test]
    fn upsert_assigns_ids_and_overwrites() {
        let store = SqliteTaskStore::open_in_memory().expect("store");
        let first = store.upsert(&Task::new("First")).expect("insert");
        let second = store.upsert(&Task::new("Second")).expect("insert");
        assert!(first.id > 0);
        assert!(second.id > first.id);

        let mut edited = first.clone();
        edited.title = "First, edited".to_string();
        edited.priority = Priority::High;
        store.upsert(&edited).expect("overwrite");

        let loaded = store.task(first.id).expect("query").expect("present");
        assert_eq!(loaded, edited);
        assert_eq!(store.tasks().expect("list").len(), 2);
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let store = SqliteTaskStore::open_in_memory().expect("store");
        let first = store.upsert(&Task::new("One")).expect("insert");
        assert!(store.delete(first.id).expect("delete"));
        let second = store.upsert(&Task::new("Two")).expect("insert");
        assert!(second.id > first.id);
    }

    #[test]
    fn missing_task_is_none_not_error() {
        let store = SqliteTaskStore::open_in_memory().expect("store");
        assert_eq!(store.task(42).expect("query"), None);
        assert!(!store.delete(42).expect("delete"));
    }

    #[test]
    fn list_orders_by_due_then_priority_with_undated_last() {
        let store = SqliteTaskStore::open_in_memory().expect("store");
        let undated = store
            .upsert(&Task::new("Someday").with_priority(Priority::High))
            .expect("insert");
        let later = store
            .upsert(&Task::new("Later").with_due_date(base() + Duration::days(2)))
            .expect("insert");
        let soon_low = store
            .upsert(
                &Task::new("Soon low")
                    .with_due_date(base())
                    .with_priority(Priority::Low),
            )
            .expect("insert");
        let soon_high = store
            .upsert(
                &Task::new("Soon high")
                    .with_due_date(base())
                    .with_priority(Priority::High),
            )
            .expect("insert");

        let tasks = store.tasks().expect("list");
        assert_eq!(
            ids(&tasks),
            vec![soon_high.id, soon_low.id, later.id, undated.id]
        );
    }

    #[test]
    fn round_trips_every_field() {
        let store = SqliteTaskStore::open_in_memory().expect("store");
        let parent = store.upsert(&Task::new("Parent")).expect("insert");
        let mut task = Task::new("Child")
            .with_description("notes")
            .with_due_date(base())
            .with_priority(Priority::Low)
            .with_parent(parent.id)
            .completed(true);
        task.is_recurring = true;
        let stored = store.upsert(&task).expect("insert");

        let loaded = store.task(stored.id).expect("query").expect("present");
        assert_eq!(loaded, stored);
        assert_eq!(loaded.due_millis(), Some(base().timestamp_millis()));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let store = SqliteTaskStore::open_in_memory().expect("store");
        let err = store
            .upsert(&Task::new("Orphan").with_parent(99))
            .expect_err("foreign key");
        assert!(matches!(err, Error::ParentNotFound(99)));
    }

    #[test]
    fn delete_cascades_to_descendants() {
        let store = SqliteTaskStore::open_in_memory().expect("store");
        let root = store.upsert(&Task::new("Root")).expect("insert");
        let child = store
            .upsert(&Task::new("Child").with_parent(root.id))
            .expect("insert");
        store
            .upsert(&Task::new("Grandchild").with_parent(child.id))
            .expect("insert");
        let other = store.upsert(&Task::new("Other")).expect("insert");

        assert!(store.delete(root.id).expect("delete"));
        assert_eq!(ids(&store.tasks().expect("list")), vec![other.id]);
    }

    #[test]
    fn writes_publish_changes() {
        let store = SqliteTaskStore::open_in_memory().expect("store");
        let mut feed = store.subscribe();
        let task = store.upsert(&Task::new("Watch me")).expect("insert");
        store.delete(task.id).expect("delete");

        assert_eq!(feed.try_recv().expect("upsert"), StoreChange::Upserted(task.id));
        assert_eq!(feed.try_recv().expect("delete"), StoreChange::Deleted(task.id));
        assert!(feed.try_recv().is_err());
    }

    #[test]
    fn open_creates_file_and_stamps_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("lvlup.db");
        let store = SqliteTaskStore::open(&path).expect("open");
        store.upsert(&Task::new("Persisted")).expect("insert");
        assert_eq!(store.schema_version().expect("version"), Some(SCHEMA_VERSION));
        drop(store);

        let reopened = SqliteTaskStore::open(&path).expect("reopen");
        assert_eq!(reopened.tasks().expect("list").len(), 1);
        assert_eq!(reopened.path(), Some(path.as_path()));
    }
}
