use std::collections::HashSet;

use rusqlite::Connection;

use super::super::types::StoreError;

/// Brings task tables created by older builds up to the current column set.
pub(super) fn ensure_tasks_columns(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare("PRAGMA table_info(tasks)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }

    if !columns.contains("status") {
        conn.execute(
            "ALTER TABLE tasks ADD COLUMN status TEXT DEFAULT 'pending'",
            [],
        )?;
    }
    if !columns.contains("red_alert") {
        conn.execute(
            "ALTER TABLE tasks ADD COLUMN red_alert INTEGER DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}
