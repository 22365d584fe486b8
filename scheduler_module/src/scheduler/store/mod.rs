use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::warn;

use super::types::{StoreError, Task, TaskId, TaskUpsert};

mod migrations;
mod schema;
mod task_rows;

use migrations::ensure_tasks_columns;
use schema::{TASKS_INDEXES, TASKS_TABLE};
use task_rows::{bool_to_int, task_from_row, TASK_COLUMNS};

/// Durable task table.
///
/// Every call opens its own connection and every mutation is a single
/// SQLite transaction, so concurrent readers (the polling loop) and
/// writers (front-ends marking tasks done) are serialized by SQLite's own
/// locking.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { path: path.into() };
        let _ = store.open()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts a task or updates the row sharing its `uid`.
    ///
    /// The row id never changes. A task already marked done stays done
    /// unless the incoming due time differs from the stored one; a moved
    /// due time is a new occurrence and returns the task to pending.
    pub fn upsert(&self, task: &TaskUpsert) -> Result<TaskId, StoreError> {
        let mut conn = self.open()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO tasks (uid, title, start_ts, end_ts, status, red_alert)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
             ON CONFLICT(uid) DO UPDATE SET
                title = excluded.title,
                start_ts = excluded.start_ts,
                end_ts = excluded.end_ts,
                red_alert = excluded.red_alert,
                status = CASE
                    WHEN tasks.status = 'done' AND IFNULL(tasks.end_ts, 0) != excluded.end_ts
                        THEN 'pending'
                    ELSE tasks.status
                END",
            params![
                task.uid,
                task.title,
                task.start_ts,
                task.due_ts,
                bool_to_int(task.red_alert)
            ],
        )?;
        let id = tx.query_row(
            "SELECT id FROM tasks WHERE uid = ?1",
            params![task.uid],
            |row| row.get::<_, TaskId>(0),
        )?;
        tx.commit()?;
        Ok(id)
    }

    /// Tasks not yet marked done, in store order.
    ///
    /// Rows that cannot be decoded (e.g. text written into a timestamp
    /// column by another tool) are logged and skipped.
    pub fn list_pending(&self) -> Result<Vec<Task>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status IS NULL OR status != 'done'"
        ))?;
        let mut rows = stmt.query([])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            match task_from_row(row) {
                Ok(task) => tasks.push(task),
                Err(err) => warn!(
                    "skipping undecodable task row {}: {}",
                    row.get::<_, TaskId>(0)
                        .map(|id| id.to_string())
                        .unwrap_or_else(|_| "?".to_string()),
                    err
                ),
            }
        }
        Ok(tasks)
    }

    pub fn get(&self, id: TaskId) -> Result<Task, StoreError> {
        let conn = self.open()?;
        conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            task_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound(id))
    }

    /// Marks a task done. Marking an already-done task is a no-op.
    pub fn mark_done(&self, id: TaskId) -> Result<(), StoreError> {
        let conn = self.open()?;
        let updated = conn.execute(
            "UPDATE tasks SET status = 'done' WHERE id = ?1",
            params![id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Removes the row. Returns `false` when no such task existed.
    pub fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        let conn = self.open()?;
        let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn open(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(TASKS_TABLE)?;
        ensure_tasks_columns(&conn)?;
        conn.execute_batch(TASKS_INDEXES)?;
        Ok(conn)
    }
}
