use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use alert_module::SoundPlayer;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::scheduler::TaskId;

/// One background thread cycling play -> burst -> silence -> rest until
/// its stop channel fires or is dropped.
pub(crate) struct RepeatingAlert {
    task_id: TaskId,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingAlert {
    pub(crate) fn start(
        task_id: TaskId,
        player: Arc<dyn SoundPlayer>,
        burst: Duration,
        repeat_interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            run_bursts(task_id, player.as_ref(), burst, repeat_interval, &stop_rx);
        });
        Self {
            task_id,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Signals the thread and waits for it to silence playback.
    pub(crate) fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("repeating alert thread for task {} panicked", self.task_id);
            }
        }
    }
}

fn run_bursts(
    task_id: TaskId,
    player: &dyn SoundPlayer,
    burst: Duration,
    repeat_interval: Duration,
    stop_rx: &Receiver<()>,
) {
    loop {
        let playback = match player.play() {
            Ok(playback) => Some(playback),
            Err(err) => {
                warn!("alert playback failed for task {}: {}", task_id, err);
                None
            }
        };
        let stopped = wait_for_stop(stop_rx, burst);
        if let Some(playback) = playback {
            if let Err(err) = playback.stop() {
                warn!("failed to stop playback for task {}: {}", task_id, err);
            }
        }
        if stopped || wait_for_stop(stop_rx, repeat_interval) {
            break;
        }
    }
    debug!("repeating alert for task {} exited", task_id);
}

/// Returns `true` once a stop was requested (or the handle was dropped).
fn wait_for_stop(stop_rx: &Receiver<()>, timeout: Duration) -> bool {
    !matches!(stop_rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
}
