//! Loopback fan-out of due-task events to connected front-ends.
//!
//! Wire format: one JSON object per line. The server writes `alert`
//! records; clients may send `done` acknowledgements or `ping`, anything
//! else is discarded without closing the connection.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, warn};

use crate::scheduler::{Task, TaskId};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_CLIENT_LINE_BYTES: usize = 64 * 1024;

pub const DEFAULT_CLIENT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Receives due-task events from the polling engine.
pub trait AlertSink: Send + Sync {
    fn publish(&self, event: &AlertEvent);
}

/// Drops every event; used when no front-end socket is wanted.
#[derive(Debug, Default, Clone)]
pub struct NullSink;

impl AlertSink for NullSink {
    fn publish(&self, _event: &AlertEvent) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub task_id: TaskId,
    pub uid: String,
    pub title: String,
    pub start_ts: i64,
    pub end_ts: i64,
    pub red: u8,
}

impl AlertEvent {
    pub fn from_task(task: &Task) -> Self {
        Self {
            kind: "alert".to_string(),
            task_id: task.id,
            uid: task.uid.clone(),
            title: task.title.clone(),
            start_ts: task.start_ts.max(0),
            end_ts: task.due_ts.max(0),
            red: u8::from(task.red_alert),
        }
    }
}

/// Messages a front-end may send back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Done { task_id: TaskId },
    Ping,
}

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct BroadcastOptions {
    pub write_timeout: Duration,
    /// Where valid client messages are forwarded, if anywhere.
    pub inbound: Option<Sender<ClientMessage>>,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_CLIENT_WRITE_TIMEOUT,
            inbound: None,
        }
    }
}

struct Client {
    id: u64,
    peer: SocketAddr,
    stream: Arc<TcpStream>,
}

type ClientList = Arc<Mutex<Vec<Client>>>;

pub struct BroadcastServer {
    local_addr: SocketAddr,
    clients: ClientList,
    stop: Arc<AtomicBool>,
    threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BroadcastServer {
    /// Binds the listener and starts the accept loop on its own thread.
    pub fn bind(addr: SocketAddr, options: BroadcastOptions) -> Result<Self, BroadcastError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(128)?;
        let listener: TcpListener = socket.into();
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let server = Self {
            local_addr,
            clients: Arc::new(Mutex::new(Vec::new())),
            stop: Arc::new(AtomicBool::new(false)),
            threads: Arc::new(Mutex::new(Vec::new())),
        };

        let clients = server.clients.clone();
        let stop = server.stop.clone();
        let threads = server.threads.clone();
        let handle = thread::spawn(move || {
            accept_loop(listener, clients, stop, threads, options);
        });
        lock(&server.threads).push(handle);

        info!("broadcast server listening on {}", local_addr);
        Ok(server)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn client_count(&self) -> usize {
        lock(&self.clients).len()
    }

    /// Writes `event` to every connected client and returns how many
    /// received it. Clients whose write fails are disconnected.
    pub fn broadcast(&self, event: &AlertEvent) -> usize {
        let mut line = match serde_json::to_vec(event) {
            Ok(line) => line,
            Err(err) => {
                error!("failed to encode alert event {}: {}", event.task_id, err);
                return 0;
            }
        };
        line.push(b'\n');

        let targets: Vec<(u64, SocketAddr, Arc<TcpStream>)> = lock(&self.clients)
            .iter()
            .map(|client| (client.id, client.peer, client.stream.clone()))
            .collect();

        let mut delivered = 0usize;
        let mut failed = Vec::new();
        for (id, peer, stream) in targets {
            match (&*stream).write_all(&line).and_then(|_| (&*stream).flush()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!("dropping broadcast client {}: {}", peer, err);
                    let _ = stream.shutdown(Shutdown::Both);
                    failed.push(id);
                }
            }
        }
        if !failed.is_empty() {
            lock(&self.clients).retain(|client| !failed.contains(&client.id));
        }
        debug!(
            "alert for task {} delivered to {} client(s)",
            event.task_id, delivered
        );
        delivered
    }

    /// Stops accepting, closes every client socket and joins the threads.
    pub fn shutdown(&self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        let clients: Vec<Client> = lock(&self.clients).drain(..).collect();
        for client in &clients {
            let _ = client.stream.shutdown(Shutdown::Both);
        }
        let handles: Vec<JoinHandle<()>> = lock(&self.threads).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("broadcast thread panicked");
            }
        }
        info!(
            "broadcast server on {} stopped ({} client(s) closed)",
            self.local_addr,
            clients.len()
        );
    }
}

impl AlertSink for BroadcastServer {
    fn publish(&self, event: &AlertEvent) {
        self.broadcast(event);
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(
    listener: TcpListener,
    clients: ClientList,
    stop: Arc<AtomicBool>,
    threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
    options: BroadcastOptions,
) {
    let mut next_id = 0u64;
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                next_id += 1;
                match register_client(next_id, stream, peer, &clients, &stop, &options) {
                    Ok(handle) => {
                        let mut threads = lock(&threads);
                        threads.retain(|handle| !handle.is_finished());
                        threads.push(handle);
                    }
                    Err(err) => warn!("failed to register client {}: {}", peer, err),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                warn!("broadcast accept failed: {}", err);
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    debug!("broadcast accept loop exited");
}

fn register_client(
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    clients: &ClientList,
    stop: &Arc<AtomicBool>,
    options: &BroadcastOptions,
) -> io::Result<JoinHandle<()>> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CLIENT_READ_TIMEOUT))?;
    stream.set_write_timeout(Some(options.write_timeout))?;
    stream.set_nodelay(true)?;
    let stream = Arc::new(stream);
    lock(clients).push(Client {
        id,
        peer,
        stream: stream.clone(),
    });
    info!("broadcast client connected: {}", peer);

    let clients = clients.clone();
    let stop = stop.clone();
    let inbound = options.inbound.clone();
    Ok(thread::spawn(move || {
        read_client(&stream, peer, &stop, inbound.as_ref());
        lock(&clients).retain(|client| client.id != id);
        let _ = stream.shutdown(Shutdown::Both);
        info!("broadcast client disconnected: {}", peer);
    }))
}

fn read_client(
    stream: &TcpStream,
    peer: SocketAddr,
    stop: &AtomicBool,
    inbound: Option<&Sender<ClientMessage>>,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    while !stop.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if buf.ends_with(b"\n") {
                    handle_client_line(&buf, peer, inbound);
                    buf.clear();
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) => {}
            Err(err) => {
                debug!("broadcast client {} read failed: {}", peer, err);
                break;
            }
        }
        if buf.len() > MAX_CLIENT_LINE_BYTES {
            warn!("discarding oversized line from broadcast client {}", peer);
            buf.clear();
        }
    }
}

fn handle_client_line(line: &[u8], peer: SocketAddr, inbound: Option<&Sender<ClientMessage>>) {
    if line.iter().all(u8::is_ascii_whitespace) {
        return;
    }
    match serde_json::from_slice::<ClientMessage>(line) {
        Ok(message) => {
            debug!("client {} sent {:?}", peer, message);
            if let Some(inbound) = inbound {
                let _ = inbound.send(message);
            }
        }
        Err(err) => debug!("discarding malformed line from client {}: {}", peer, err),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}
