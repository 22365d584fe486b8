use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alert_module::{ActivePlayback, NotificationError, Notifier, PlaybackError, SoundPlayer};
use crossbeam_channel::{Receiver, Sender};

use crate::broadcast::{AlertEvent, AlertSink};
use crate::calendar_sync::{CalendarSync, SyncError};
use crate::scheduler::{TaskId, TaskStore, TaskUpsert};

pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[derive(Default)]
pub(crate) struct CountingNotifier {
    titles: Mutex<Vec<String>>,
    fail: bool,
}

impl CountingNotifier {
    pub(crate) fn failing() -> Self {
        Self {
            titles: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(crate) fn shown(&self) -> usize {
        self.titles.lock().expect("titles").len()
    }

    pub(crate) fn titles(&self) -> Vec<String> {
        self.titles.lock().expect("titles").clone()
    }
}

impl Notifier for CountingNotifier {
    fn show(&self, title: &str, _message: &str) -> Result<(), NotificationError> {
        self.titles.lock().expect("titles").push(title.to_string());
        if self.fail {
            return Err(NotificationError::CommandNotFound("notify-send".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct CountingPlayer {
    plays: AtomicUsize,
    stops: Arc<AtomicUsize>,
    fail: bool,
}

impl CountingPlayer {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl SoundPlayer for CountingPlayer {
    fn play(&self) -> Result<Box<dyn ActivePlayback>, PlaybackError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PlaybackError::CommandNotFound("paplay".to_string()));
        }
        Ok(Box::new(CountingPlayback {
            stops: self.stops.clone(),
        }))
    }
}

struct CountingPlayback {
    stops: Arc<AtomicUsize>,
}

impl ActivePlayback for CountingPlayback {
    fn stop(self: Box<Self>) -> Result<(), PlaybackError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct CollectingSink {
    events: Mutex<Vec<AlertEvent>>,
}

impl CollectingSink {
    pub(crate) fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().expect("events").clone()
    }
}

impl AlertSink for CollectingSink {
    fn publish(&self, event: &AlertEvent) {
        self.events.lock().expect("events").push(event.clone());
    }
}

/// Blocks inside `publish` until released, to stand in for a stalled client.
pub(crate) struct GatedSink {
    pub(crate) entered: Sender<TaskId>,
    pub(crate) release: Receiver<()>,
}

impl AlertSink for GatedSink {
    fn publish(&self, event: &AlertEvent) {
        let _ = self.entered.send(event.task_id);
        let _ = self.release.recv_timeout(Duration::from_secs(5));
    }
}

/// Upserts a fixed set of records on every sync.
pub(crate) struct StaticSync {
    pub(crate) tasks: Vec<TaskUpsert>,
    pub(crate) calls: AtomicUsize,
}

impl StaticSync {
    pub(crate) fn new(tasks: Vec<TaskUpsert>) -> Self {
        Self {
            tasks,
            calls: AtomicUsize::new(0),
        }
    }
}

impl CalendarSync for StaticSync {
    fn name(&self) -> &str {
        "static"
    }

    fn sync(&self, store: &TaskStore) -> Result<usize, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for task in &self.tasks {
            store.upsert(task)?;
        }
        Ok(self.tasks.len())
    }
}

pub(crate) struct FailingSync;

impl CalendarSync for FailingSync {
    fn name(&self) -> &str {
        "failing"
    }

    fn sync(&self, _store: &TaskStore) -> Result<usize, SyncError> {
        Err(SyncError::Source("calendar unreachable".to_string()))
    }
}
