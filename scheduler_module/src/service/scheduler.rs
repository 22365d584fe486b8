use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::broadcast::ClientMessage;
use crate::scheduler::ReminderEngine;

const ACK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Handles for the polling thread and the acknowledgement consumer.
pub struct EngineControl {
    stop: Arc<AtomicBool>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl EngineControl {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Returns once the polling loop has exited and silenced its alerts.
    pub fn stop_and_join(&mut self) {
        self.stop();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("engine thread panicked");
            }
        }
    }
}

/// Starts the polling loop and, when `acks` is given, a consumer that turns
/// client `done` messages into [`ReminderEngine::mark_done`] calls.
pub fn start_engine_threads(
    engine: Arc<ReminderEngine>,
    acks: Option<Receiver<ClientMessage>>,
) -> EngineControl {
    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::with_capacity(2);

    {
        let engine = engine.clone();
        let stop = stop.clone();
        handles.push(thread::spawn(move || engine.run_loop(&stop)));
    }

    if let Some(acks) = acks {
        let stop = stop.clone();
        handles.push(thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                match acks.recv_timeout(ACK_POLL_INTERVAL) {
                    Ok(ClientMessage::Done { task_id }) => {
                        if let Err(err) = engine.mark_done(task_id) {
                            warn!("client acknowledgement for task {} failed: {}", task_id, err);
                        }
                    }
                    Ok(ClientMessage::Ping) => debug!("client ping"),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("acknowledgement consumer stopped");
        }));
    }

    EngineControl { stop, handles }
}
