//! Alert lifecycle: a one-shot notification for every due task plus a
//! repeating sound for red-alert tasks, at most one per task id.

mod repeating;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alert_module::{Notifier, SoundPlayer};
use tracing::{debug, info, warn};

use crate::scheduler::TaskId;

use repeating::RepeatingAlert;

pub const DEFAULT_RED_ALERT_BURST: Duration = Duration::from_secs(30);
pub const DEFAULT_RED_ALERT_REPEAT: Duration = Duration::from_secs(120);

const NOTIFICATION_MESSAGE: &str = "Open checklist to mark done.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertSettings {
    /// How long each burst of sound plays.
    pub burst: Duration,
    /// Silence between bursts.
    pub repeat_interval: Duration,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            burst: DEFAULT_RED_ALERT_BURST,
            repeat_interval: DEFAULT_RED_ALERT_REPEAT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    /// A repeating alert was already registered; nothing happened.
    AlreadyActive,
    /// Notification shown, no repeating sound (normal priority).
    Notified,
    /// Notification shown and a repeating sound registered.
    Alerting,
}

/// Owns the registry of running repeating alerts.
///
/// The registry lock is only held to look up, insert or remove entries;
/// notifications and playback shutdown happen outside of it.
pub struct AlertController {
    registry: Mutex<HashMap<TaskId, RepeatingAlert>>,
    notifier: Arc<dyn Notifier>,
    player: Arc<dyn SoundPlayer>,
}

impl AlertController {
    pub fn new(notifier: Arc<dyn Notifier>, player: Arc<dyn SoundPlayer>) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            notifier,
            player,
        }
    }

    pub fn start(
        &self,
        task_id: TaskId,
        title: &str,
        high_priority: bool,
        settings: &AlertSettings,
    ) -> AlertOutcome {
        {
            let mut registry = self.lock_registry();
            if registry.contains_key(&task_id) {
                debug!("alert for task {} already active", task_id);
                return AlertOutcome::AlreadyActive;
            }
            if high_priority {
                let alert = RepeatingAlert::start(
                    task_id,
                    self.player.clone(),
                    settings.burst,
                    settings.repeat_interval,
                );
                registry.insert(task_id, alert);
            }
        }

        if let Err(err) = self
            .notifier
            .show(&format!("Due: {}", title), NOTIFICATION_MESSAGE)
        {
            warn!("notification failed for task {}: {}", task_id, err);
        }

        if high_priority {
            info!(
                "red alert started for task {} (burst {:?}, repeat {:?})",
                task_id, settings.burst, settings.repeat_interval
            );
            AlertOutcome::Alerting
        } else {
            AlertOutcome::Notified
        }
    }

    /// Stops the repeating alert for `task_id`. Returns `false` if none was
    /// registered.
    pub fn stop(&self, task_id: TaskId) -> bool {
        let alert = self.lock_registry().remove(&task_id);
        match alert {
            Some(alert) => {
                alert.stop();
                info!("red alert stopped for task {}", task_id);
                true
            }
            None => false,
        }
    }

    /// Stops every registered alert and returns how many were running.
    pub fn stop_all(&self) -> usize {
        let alerts: Vec<(TaskId, RepeatingAlert)> = self.lock_registry().drain().collect();
        let count = alerts.len();
        for (task_id, alert) in alerts {
            alert.stop();
            debug!("red alert stopped for task {}", task_id);
        }
        count
    }

    pub fn is_active(&self, task_id: TaskId) -> bool {
        self.lock_registry().contains_key(&task_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock_registry().len()
    }

    fn lock_registry(&self) -> MutexGuard<'_, HashMap<TaskId, RepeatingAlert>> {
        self.registry
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{wait_until, CountingNotifier, CountingPlayer};

    fn fast_settings() -> AlertSettings {
        AlertSettings {
            burst: Duration::from_millis(40),
            repeat_interval: Duration::from_millis(40),
        }
    }

    fn controller() -> (Arc<CountingNotifier>, Arc<CountingPlayer>, AlertController) {
        let notifier = Arc::new(CountingNotifier::default());
        let player = Arc::new(CountingPlayer::default());
        let controller = AlertController::new(notifier.clone(), player.clone());
        (notifier, player, controller)
    }

    #[test]
    fn duplicate_start_keeps_single_repeating_alert() {
        let (notifier, player, controller) = controller();
        let settings = AlertSettings {
            burst: Duration::from_secs(5),
            repeat_interval: Duration::from_secs(5),
        };

        assert_eq!(
            controller.start(7, "Take pills", true, &settings),
            AlertOutcome::Alerting
        );
        assert_eq!(
            controller.start(7, "Take pills", true, &settings),
            AlertOutcome::AlreadyActive
        );

        assert!(wait_until(Duration::from_secs(2), || player.plays() >= 1));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(player.plays(), 1);
        assert_eq!(notifier.shown(), 1);
        assert_eq!(controller.active_count(), 1);

        assert!(controller.stop(7));
        assert_eq!(player.stops(), 1);
    }

    #[test]
    fn normal_priority_notifies_without_registry_entry() {
        let (notifier, player, controller) = controller();
        assert_eq!(
            controller.start(3, "Standup", false, &fast_settings()),
            AlertOutcome::Notified
        );
        assert_eq!(notifier.shown(), 1);
        assert!(!controller.is_active(3));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(player.plays(), 0);
        assert_eq!(notifier.titles(), vec!["Due: Standup".to_string()]);
    }

    #[test]
    fn stop_without_alert_is_noop() {
        let (_notifier, _player, controller) = controller();
        assert!(!controller.stop(99));
        assert!(!controller.stop(99));
    }

    #[test]
    fn stop_interrupts_long_burst_promptly() {
        let (_notifier, player, controller) = controller();
        let settings = AlertSettings {
            burst: Duration::from_secs(60),
            repeat_interval: Duration::from_secs(60),
        };
        controller.start(1, "Take pills", true, &settings);
        assert!(wait_until(Duration::from_secs(2), || player.plays() == 1));

        let started = std::time::Instant::now();
        assert!(controller.stop(1));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(player.stops(), 1);
        assert!(!controller.is_active(1));
    }

    #[test]
    fn bursts_repeat_until_stopped() {
        let (_notifier, player, controller) = controller();
        controller.start(5, "Take pills", true, &fast_settings());
        assert!(wait_until(Duration::from_secs(3), || player.plays() >= 3));
        controller.stop(5);
        let plays = player.plays();
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(player.plays(), plays);
    }

    #[test]
    fn playback_failure_does_not_break_alert_state() {
        let notifier = Arc::new(CountingNotifier::failing());
        let player = Arc::new(CountingPlayer::failing());
        let controller = AlertController::new(notifier.clone(), player.clone());

        assert_eq!(
            controller.start(11, "Take pills", true, &fast_settings()),
            AlertOutcome::Alerting
        );
        assert!(wait_until(Duration::from_secs(2), || player.plays() >= 1));
        assert!(controller.is_active(11));
        assert!(controller.stop(11));
    }

    #[test]
    fn stop_all_silences_everything() {
        let (_notifier, _player, controller) = controller();
        controller.start(1, "a", true, &fast_settings());
        controller.start(2, "b", true, &fast_settings());
        controller.start(3, "c", false, &fast_settings());
        assert_eq!(controller.stop_all(), 2);
        assert_eq!(controller.active_count(), 0);
    }
}
