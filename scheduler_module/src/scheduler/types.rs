use serde::{Deserialize, Serialize};

/// Store-assigned surrogate key of a task row.
pub type TaskId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
        }
    }

    /// Anything other than `done` (including NULL in legacy rows) is pending.
    pub(crate) fn from_column(raw: Option<&str>) -> Self {
        match raw {
            Some("done") => TaskStatus::Done,
            _ => TaskStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Stable key supplied by the calendar source.
    pub uid: String,
    pub title: String,
    /// Unix seconds, 0 when unknown.
    pub start_ts: i64,
    /// Unix seconds, 0 when unknown.
    pub due_ts: i64,
    pub status: TaskStatus,
    pub red_alert: bool,
}

impl Task {
    /// A zero due time means the source gave no time at all; such tasks never fire.
    pub fn is_due(&self, now_ts: i64) -> bool {
        self.status == TaskStatus::Pending && self.due_ts > 0 && self.due_ts <= now_ts
    }
}

/// A normalized record handed to [`TaskStore::upsert`](crate::TaskStore::upsert)
/// by a calendar adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpsert {
    pub uid: String,
    pub title: String,
    pub start_ts: i64,
    pub due_ts: i64,
    pub red_alert: bool,
}

impl TaskUpsert {
    /// Without an explicit end time the task is due when it starts.
    pub fn new(
        uid: impl Into<String>,
        title: impl Into<String>,
        start_ts: i64,
        due_ts: Option<i64>,
        red_alert: bool,
    ) -> Self {
        Self {
            uid: uid.into(),
            title: title.into(),
            start_ts,
            due_ts: due_ts.unwrap_or(start_ts),
            red_alert,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error("storage error: {0}")]
    Storage(String),
}
