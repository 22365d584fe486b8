use rusqlite::Row;

use super::super::types::{Task, TaskStatus};

pub(super) const TASK_COLUMNS: &str = "id, uid, title, start_ts, end_ts, status, red_alert";

/// Maps a row selected with [`TASK_COLUMNS`]. Legacy rows may carry NULLs.
pub(super) fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status = row.get::<_, Option<String>>(5)?;
    Ok(Task {
        id: row.get(0)?,
        uid: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        start_ts: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        due_ts: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        status: TaskStatus::from_column(status.as_deref()),
        red_alert: row.get::<_, Option<i64>>(6)?.unwrap_or(0) != 0,
    })
}

pub(super) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
