//! Read-side view of pending tasks for front-ends and the CLI.

use chrono::{DateTime, Local, Utc};

use crate::scheduler::{StoreError, Task, TaskId, TaskStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistItem {
    pub id: TaskId,
    pub uid: String,
    pub title: String,
    pub start: Option<DateTime<Local>>,
    pub end: Option<DateTime<Local>>,
    pub red: bool,
}

impl ChecklistItem {
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id,
            uid: task.uid.clone(),
            title: task.title.clone(),
            start: local_time(task.start_ts),
            end: local_time(task.due_ts),
            red: task.red_alert,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.end.map(|end| end <= now).unwrap_or(false)
    }
}

/// Pending tasks, earliest due first; tasks without a due time go last.
pub fn pending_items(store: &TaskStore) -> Result<Vec<ChecklistItem>, StoreError> {
    let mut items: Vec<ChecklistItem> = store
        .list_pending()?
        .iter()
        .map(ChecklistItem::from_task)
        .collect();
    items.sort_by_key(|item| (item.end.is_none(), item.end, item.id));
    Ok(items)
}

fn local_time(ts: i64) -> Option<DateTime<Local>> {
    if ts <= 0 {
        return None;
    }
    DateTime::from_timestamp(ts, 0).map(|value| value.with_timezone(&Local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskUpsert;
    use tempfile::TempDir;

    #[test]
    fn pending_items_sorted_by_due_time() {
        let temp = TempDir::new().expect("tempdir");
        let store = TaskStore::new(temp.path().join("tasks.db")).expect("store");
        store
            .upsert(&TaskUpsert::new("late", "Late", 2_000, None, false))
            .expect("upsert");
        store
            .upsert(&TaskUpsert::new("none", "Untimed", 0, None, false))
            .expect("upsert");
        let early = store
            .upsert(&TaskUpsert::new("early", "Early", 1_000, Some(1_500), true))
            .expect("upsert");

        let items = pending_items(&store).expect("items");
        let uids: Vec<&str> = items.iter().map(|item| item.uid.as_str()).collect();
        assert_eq!(uids, vec!["early", "late", "none"]);
        assert_eq!(items[0].id, early);
        assert!(items[0].red);
        assert_eq!(items[0].end.map(|end| end.timestamp()), Some(1_500));
        assert!(items[2].start.is_none());
    }

    #[test]
    fn is_due_compares_against_end() {
        let item = ChecklistItem {
            id: 1,
            uid: "evt".to_string(),
            title: "Evt".to_string(),
            start: None,
            end: local_time(1_000),
            red: false,
        };
        let after = DateTime::from_timestamp(1_001, 0).expect("ts");
        let before = DateTime::from_timestamp(999, 0).expect("ts");
        assert!(item.is_due(after));
        assert!(!item.is_due(before));

        let untimed = ChecklistItem { end: None, ..item };
        assert!(!untimed.is_due(after));
    }
}
