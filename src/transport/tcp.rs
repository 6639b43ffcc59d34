//! TCP Transport
//!
//! One RESP2 socket to a Redis-compatible server, owned by a background
//! driver task.
//!
//! # Driver Loop
//! 1. Connect (bounded by `connect_timeout`), emit `Connected`
//! 2. Write queued commands as they arrive and match replies in FIFO order
//! 3. On an I/O, protocol or timeout failure: fail every pending command, emit `Error`, drop the socket
//! 4. Back off (doubling up to `reconnect_max_delay`), rejecting commands meanwhile, then go to 1
//!
//! Commands are never retried or parked across reconnects.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::resp::{encode_command, read_response, RespValue};
use super::{ConnectionEvent, EventHub, Transport};
use crate::config::Config;
use crate::error::{FacadeError, Result};

/// Commands waiting for the driver before callers start to wait on `send`.
const REQUEST_QUEUE_CAPACITY: usize = 1024;

struct Request {
    args: Vec<Vec<u8>>,
    reply: oneshot::Sender<Result<RespValue>>,
}

/// A command written to the socket and still owed a reply.
struct Pending {
    reply: oneshot::Sender<Result<RespValue>>,
    deadline: Option<Instant>,
}

// == TCP Transport ==
/// Handle to the driver task. Cheap to share behind an `Arc`.
pub struct TcpTransport {
    addr: String,
    requests: mpsc::Sender<Request>,
    events: Arc<EventHub>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Spawns the driver task and returns immediately.
    ///
    /// The first connection attempt happens in the background; its outcome is
    /// reported on the event stream and replayed to late subscribers through
    /// `subscribe_with_latest`. Must be called from within a tokio runtime.
    pub fn connect(config: &Config) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let events = Arc::new(EventHub::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let driver = Driver {
            addr: config.addr(),
            connect_timeout: config.connect_timeout,
            command_timeout: config.command_timeout,
            base_delay: config.reconnect_base_delay,
            max_delay: config.reconnect_max_delay.max(config.reconnect_base_delay),
            requests: requests_rx,
            events: events.clone(),
            shutdown: shutdown_rx,
        };
        let handle = tokio::spawn(driver.run());

        Self {
            addr: config.addr(),
            requests: requests_tx,
            events,
            shutdown: shutdown_tx,
            closed: AtomicBool::new(false),
            driver: Mutex::new(Some(handle)),
        }
    }

    /// Address of the store this transport dials.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn call(&self, args: Vec<Vec<u8>>) -> Result<RespValue> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FacadeError::connection("transport closed"));
        }
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { args, reply })
            .await
            .map_err(|_| FacadeError::connection("transport closed"))?;
        response
            .await
            .map_err(|_| FacadeError::connection("transport closed before reply"))?
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.call(vec![b"GET".to_vec(), key.as_bytes().to_vec()]).await? {
            RespValue::Bulk(None) => Ok(None),
            RespValue::Bulk(Some(data)) => String::from_utf8(data)
                .map(Some)
                .map_err(|_| FacadeError::connection("stored value is not valid UTF-8")),
            other => Err(unexpected(other)),
        }
    }

    async fn set_ex(&self, key: &str, seconds: u64, value: &str) -> Result<()> {
        let args = vec![
            b"SETEX".to_vec(),
            key.as_bytes().to_vec(),
            seconds.to_string().into_bytes(),
            value.as_bytes().to_vec(),
        ];
        match self.call(args).await? {
            RespValue::Simple(_) => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn del(&self, key: &str) -> Result<u64> {
        match self.call(vec![b"DEL".to_vec(), key.as_bytes().to_vec()]).await? {
            RespValue::Integer(count) => Ok(count.max(0) as u64),
            other => Err(unexpected(other)),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn subscribe_with_latest(
        &self,
    ) -> (Option<ConnectionEvent>, broadcast::Receiver<ConnectionEvent>) {
        self.events.subscribe_with_latest()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        let handle = self.driver.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(addr = %self.addr, "transport driver ended abnormally: {}", err);
            }
        }
    }
}

fn unexpected(value: RespValue) -> FacadeError {
    match value {
        RespValue::Error(message) => FacadeError::connection(format!(
            "command rejected by the store: {}",
            String::from_utf8_lossy(&message)
        )),
        other => FacadeError::connection(format!("unexpected reply: {:?}", other)),
    }
}

// == Driver ==
struct Driver {
    addr: String,
    connect_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
    base_delay: Duration,
    max_delay: Duration,
    requests: mpsc::Receiver<Request>,
    events: Arc<EventHub>,
    shutdown: watch::Receiver<bool>,
}

enum Served {
    /// Close requested or every handle dropped
    Stop,
    /// The link broke; carries the reason
    Broken(FacadeError),
}

impl Driver {
    async fn run(mut self) {
        let mut delay = self.base_delay;

        loop {
            let opened = tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => break,
                opened = Connection::open(&self.addr, self.connect_timeout) => opened,
            };

            match opened {
                Ok(conn) => {
                    info!(addr = %self.addr, "connected to store");
                    delay = self.base_delay;
                    self.emit(ConnectionEvent::Connected);
                    match self.serve(conn).await {
                        Served::Stop => break,
                        Served::Broken(err) => {
                            warn!(addr = %self.addr, "connection lost: {}", err);
                            self.emit(ConnectionEvent::Error(err.to_string()));
                        }
                    }
                }
                Err(err) => {
                    warn!(addr = %self.addr, "failed to connect: {}", err);
                    self.emit(ConnectionEvent::Error(err.to_string()));
                }
            }

            if !self.back_off(delay).await {
                break;
            }
            delay = delay.saturating_mul(2).min(self.max_delay);
        }

        self.requests.close();
        while let Ok(request) = self.requests.try_recv() {
            let _ = request
                .reply
                .send(Err(FacadeError::connection("transport closed")));
        }
        info!(addr = %self.addr, "transport closed");
        self.emit(ConnectionEvent::Closed);
    }

    async fn serve(&mut self, mut conn: Connection) -> Served {
        let mut in_flight: VecDeque<Pending> = VecDeque::new();

        let served = loop {
            let deadline = in_flight.front().and_then(|pending| pending.deadline);

            tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => break Served::Stop,
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        break Served::Stop;
                    };
                    match conn.send(&request.args, self.command_timeout).await {
                        Ok(()) => in_flight.push_back(Pending {
                            reply: request.reply,
                            deadline: self.command_timeout.map(|limit| Instant::now() + limit),
                        }),
                        Err(err) => {
                            let _ = request.reply.send(Err(err.clone()));
                            break Served::Broken(err);
                        }
                    }
                }
                reply = conn.next_reply() => match (reply, in_flight.pop_front()) {
                    (Ok(value), Some(pending)) => {
                        let _ = pending.reply.send(Ok(value));
                    }
                    (Ok(value), None) => {
                        break Served::Broken(FacadeError::connection(format!(
                            "protocol error: reply with no pending command: {:?}",
                            value
                        )));
                    }
                    (Err(err), pending) => {
                        if let Some(pending) = pending {
                            let _ = pending.reply.send(Err(err.clone()));
                        }
                        break Served::Broken(err);
                    }
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let err = FacadeError::connection("command timed out");
                    if let Some(pending) = in_flight.pop_front() {
                        let _ = pending.reply.send(Err(err.clone()));
                    }
                    break Served::Broken(err);
                }
            }
        };

        // Replies still owed on this socket can never arrive now
        let reason = match &served {
            Served::Stop => FacadeError::connection("transport closed"),
            Served::Broken(err) => err.clone(),
        };
        for pending in in_flight.drain(..) {
            let _ = pending.reply.send(Err(reason.clone()));
        }
        served
    }

    /// Sleeps for `delay` while failing incoming commands. Returns false on shutdown.
    async fn back_off(&mut self, delay: Duration) -> bool {
        debug!(addr = %self.addr, ?delay, "reconnecting after delay");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = wait_for_shutdown(&mut self.shutdown) => return false,
                request = self.requests.recv() => match request {
                    Some(request) => {
                        let _ = request
                            .reply
                            .send(Err(FacadeError::connection("not connected to store")));
                    }
                    None => return false,
                },
            }
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        self.events.emit(event);
    }
}

/// Resolves once shutdown is requested or the transport handle is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let requested = *shutdown.borrow_and_update();
        if requested {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

// == Connection ==
/// Single TCP connection: the write half stays with the driver, a reader task
/// parses replies off the read half.
struct Connection {
    writer: OwnedWriteHalf,
    write_buf: Vec<u8>,
    replies: mpsc::Receiver<Result<RespValue>>,
    reader: JoinHandle<()>,
}

impl Connection {
    async fn open(addr: &str, connect_timeout: Option<Duration>) -> Result<Self> {
        let stream = match connect_timeout {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| FacadeError::connection(format!("connect to {} timed out", addr)))??,
            None => TcpStream::connect(addr).await?,
        };
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let (read_half, writer) = stream.into_split();
        let (replies_tx, replies) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
        let reader = tokio::spawn(read_replies(BufReader::new(read_half), replies_tx));

        Ok(Self {
            writer,
            write_buf: Vec::with_capacity(256),
            replies,
            reader,
        })
    }

    /// Writes one command without waiting for its reply.
    async fn send(&mut self, args: &[Vec<u8>], limit: Option<Duration>) -> Result<()> {
        let parts: Vec<&[u8]> = args.iter().map(Vec::as_slice).collect();
        self.write_buf.clear();
        encode_command(&parts, &mut self.write_buf);

        let write = async {
            self.writer.write_all(&self.write_buf).await?;
            self.writer.flush().await
        };
        match limit {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| FacadeError::connection("command timed out"))??,
            None => write.await?,
        }
        Ok(())
    }

    /// Next reply off the wire, in the order commands were written.
    async fn next_reply(&mut self) -> Result<RespValue> {
        match self.replies.recv().await {
            Some(reply) => reply,
            None => Err(FacadeError::connection("connection closed by peer")),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Parses replies until the socket fails, forwarding each one. The first
/// failure is forwarded too and ends the task.
async fn read_replies(
    mut reader: BufReader<OwnedReadHalf>,
    replies: mpsc::Sender<Result<RespValue>>,
) {
    let mut line_buf = Vec::with_capacity(128);
    loop {
        let reply = read_response(&mut reader, &mut line_buf).await;
        let failed = reply.is_err();
        if replies.send(reply).await.is_err() || failed {
            return;
        }
    }
}
