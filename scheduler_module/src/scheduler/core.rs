use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertController, AlertSettings};
use crate::broadcast::{AlertEvent, AlertSink};
use crate::calendar_sync::CalendarSync;

use super::store::TaskStore;
use super::types::{StoreError, Task, TaskId};

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Longest stretch the loop sleeps before looking at its stop flag again.
const STOP_POLL_SLICE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub check_interval: Duration,
    pub alert: AlertSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            alert: AlertSettings::default(),
        }
    }
}

/// Polls the task store for due tasks and drives alerts and broadcasts.
///
/// Each task alerts once per transition into "due"; the set of already
/// alerted ids lives in memory only, so a restart re-alerts tasks that are
/// still pending.
pub struct ReminderEngine {
    store: TaskStore,
    alerts: Arc<AlertController>,
    sync: Box<dyn CalendarSync>,
    sink: Arc<dyn AlertSink>,
    settings: EngineSettings,
    alerted: Mutex<HashSet<TaskId>>,
}

impl ReminderEngine {
    pub fn new(
        store: TaskStore,
        alerts: Arc<AlertController>,
        sync: Box<dyn CalendarSync>,
        sink: Arc<dyn AlertSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            alerts,
            sync,
            sink,
            settings,
            alerted: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn alerts(&self) -> &AlertController {
        &self.alerts
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// One polling cycle: refresh calendars, then alert newly due tasks.
    /// Returns the ids that alerted in this cycle.
    pub fn tick(&self) -> Result<Vec<TaskId>, StoreError> {
        if let Err(err) = self.sync.sync(&self.store) {
            warn!("calendar sync via {} failed: {}", self.sync.name(), err);
        }
        self.scan_due(Utc::now().timestamp())
    }

    /// Alerts every pending task due at `now_ts` that has not alerted yet.
    ///
    /// Alerted tasks that are no longer due (moved into the future, or
    /// closed outside the engine) are forgotten and silenced, so their next
    /// transition into due alerts again. The alerted set is only locked
    /// while the pending list is read and classified; notifications and
    /// broadcasts run after it is released.
    pub fn scan_due(&self, now_ts: i64) -> Result<Vec<TaskId>, StoreError> {
        let (newly_due, no_longer_due) = {
            let mut alerted = self.lock_alerted();
            let tasks = self.store.list_pending()?;
            let due_ids: HashSet<TaskId> = tasks
                .iter()
                .filter(|task| task.is_due(now_ts))
                .map(|task| task.id)
                .collect();
            let no_longer_due: Vec<TaskId> = alerted
                .iter()
                .copied()
                .filter(|id| !due_ids.contains(id))
                .collect();
            for id in &no_longer_due {
                alerted.remove(id);
            }
            let newly_due: Vec<Task> = tasks
                .into_iter()
                .filter(|task| due_ids.contains(&task.id) && alerted.insert(task.id))
                .collect();
            (newly_due, no_longer_due)
        };

        for task_id in no_longer_due {
            if self.alerts.stop(task_id) {
                info!("task {} is no longer due; alert stopped", task_id);
            } else {
                debug!("task {} is no longer due", task_id);
            }
        }

        let mut alerted_now = Vec::with_capacity(newly_due.len());
        for task in newly_due {
            self.alerts
                .start(task.id, &task.title, task.red_alert, &self.settings.alert);
            // A concurrent mark_done may have run between classification
            // and start; its stop could have missed the new alert.
            if !self.has_alerted(task.id) {
                self.alerts.stop(task.id);
                continue;
            }
            self.sink.publish(&AlertEvent::from_task(&task));
            alerted_now.push(task.id);
        }
        if !alerted_now.is_empty() {
            info!(
                "{} task(s) became due: {}",
                alerted_now.len(),
                alerted_now
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(alerted_now)
    }

    /// Marks a task done, forgets that it alerted and silences its alert, so
    /// a later re-sync with a new due time can alert again.
    pub fn mark_done(&self, task_id: TaskId) -> Result<(), StoreError> {
        {
            let mut alerted = self.lock_alerted();
            self.store.mark_done(task_id)?;
            alerted.remove(&task_id);
        }
        self.alerts.stop(task_id);
        info!("task {} marked done", task_id);
        Ok(())
    }

    /// Deletes a task row and tears down any alert it owns.
    pub fn delete_task(&self, task_id: TaskId) -> Result<(), StoreError> {
        {
            let mut alerted = self.lock_alerted();
            if !self.store.delete(task_id)? {
                return Err(StoreError::NotFound(task_id));
            }
            alerted.remove(&task_id);
        }
        self.alerts.stop(task_id);
        info!("task {} deleted", task_id);
        Ok(())
    }

    pub fn has_alerted(&self, task_id: TaskId) -> bool {
        self.lock_alerted().contains(&task_id)
    }

    /// Polls until `stop_flag` is set, then stops every registered alert.
    pub fn run_loop(&self, stop_flag: &AtomicBool) {
        info!(
            "reminder engine started (check interval {:?})",
            self.settings.check_interval
        );
        while !stop_flag.load(Ordering::Relaxed) {
            if let Err(err) = self.tick() {
                error!("due-task scan failed: {}", err);
            }
            sleep_unless_stopped(self.settings.check_interval, stop_flag);
        }
        let silenced = self.alerts.stop_all();
        info!("reminder engine stopped ({} alert(s) silenced)", silenced);
    }

    fn lock_alerted(&self) -> MutexGuard<'_, HashSet<TaskId>> {
        self.alerted
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

fn sleep_unless_stopped(total: Duration, stop_flag: &AtomicBool) {
    let deadline = Instant::now() + total;
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(STOP_POLL_SLICE));
    }
}
