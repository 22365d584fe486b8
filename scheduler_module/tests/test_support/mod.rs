#![allow(dead_code)]

use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alert_module::{ActivePlayback, NotificationError, Notifier, PlaybackError, SoundPlayer};
use scheduler_module::AlertEvent;

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

#[derive(Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().expect("shown").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, title: &str, message: &str) -> Result<(), NotificationError> {
        self.shown
            .lock()
            .expect("shown")
            .push((title.to_string(), message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPlayer {
    plays: AtomicUsize,
    stops: Arc<AtomicUsize>,
}

impl RecordingPlayer {
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl SoundPlayer for RecordingPlayer {
    fn play(&self) -> Result<Box<dyn ActivePlayback>, PlaybackError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingPlayback {
            stops: self.stops.clone(),
        }))
    }
}

struct RecordingPlayback {
    stops: Arc<AtomicUsize>,
}

impl ActivePlayback for RecordingPlayback {
    fn stop(self: Box<Self>) -> Result<(), PlaybackError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Line-oriented client for the broadcast socket.
pub struct AlertClient {
    pub stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl AlertClient {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .expect("read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone stream"));
        Self { stream, reader }
    }

    /// Reads the next alert record, or `None` if nothing arrives in time.
    pub fn next_event(&mut self, timeout: Duration) -> Option<AlertEvent> {
        let deadline = Instant::now() + timeout;
        let mut line = String::new();
        while Instant::now() < deadline {
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) if line.ends_with('\n') => {
                    return Some(serde_json::from_str(line.trim()).expect("alert json"));
                }
                Ok(_) => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(err) => panic!("read failed: {err}"),
            }
        }
        None
    }
}
