//! Shared helpers for integration tests: a scripted RESP2 store and event waiters.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kv_facade::{Config, ConnectionEvent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Notify};

/// Installs a test-friendly subscriber once; honors RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config pointing at `addr` with short, test-sized delays.
pub fn test_config(addr: SocketAddr) -> Config {
    Config {
        host: addr.ip().to_string(),
        port: addr.port(),
        connect_timeout: Some(Duration::from_secs(1)),
        command_timeout: Some(Duration::from_secs(2)),
        reconnect_base_delay: Duration::from_millis(50),
        reconnect_max_delay: Duration::from_millis(200),
    }
}

/// Returns an address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr")
}

// == Fake Store ==
/// Minimal Redis-compatible server understanding GET, SETEX and DEL.
///
/// Keys starting with `wrongtype` answer GET with an error reply.
#[derive(Clone)]
pub struct FakeStore {
    pub addr: SocketAddr,
    pub data: Arc<Mutex<HashMap<String, String>>>,
    /// Every command received, in arrival order
    pub log: Arc<Mutex<Vec<Vec<String>>>>,
    kick: Arc<Notify>,
}

impl FakeStore {
    /// Binds to an ephemeral port and serves connections one after another.
    pub async fn start() -> FakeStore {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let store = FakeStore {
            addr: listener.local_addr().expect("addr"),
            data: Arc::new(Mutex::new(HashMap::new())),
            log: Arc::new(Mutex::new(Vec::new())),
            kick: Arc::new(Notify::new()),
        };

        let server = store.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let _ = server.serve(stream).await;
            }
        });
        store
    }

    /// Drops the current client connection; the listener keeps accepting.
    pub fn kick_client(&self) {
        self.kick.notify_one();
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.log.lock().unwrap().clone()
    }

    async fn serve(&self, stream: TcpStream) -> io::Result<()> {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        loop {
            let args = tokio::select! {
                _ = self.kick.notified() => return Ok(()),
                args = read_command(&mut reader) => match args? {
                    Some(args) => args,
                    None => return Ok(()),
                },
            };
            let reply = self.reply_to(args);
            write.write_all(reply.as_bytes()).await?;
            write.flush().await?;
        }
    }

    fn reply_to(&self, args: Vec<String>) -> String {
        self.log.lock().unwrap().push(args.clone());
        let mut data = self.data.lock().unwrap();
        match (args[0].as_str(), args.len()) {
            ("GET", 2) if args[1].starts_with("wrongtype") => {
                "-WRONGTYPE Operation against a key holding the wrong kind of value\r\n".to_string()
            }
            ("GET", 2) => match data.get(&args[1]) {
                Some(value) => format!("${}\r\n{}\r\n", value.len(), value),
                None => "$-1\r\n".to_string(),
            },
            ("SETEX", 4) => {
                data.insert(args[1].clone(), args[3].clone());
                "+OK\r\n".to_string()
            }
            ("DEL", 2) => format!(":{}\r\n", data.remove(&args[1]).map_or(0, |_| 1)),
            _ => "-ERR unknown command\r\n".to_string(),
        }
    }
}

/// Accepts one client and reads its commands without ever replying.
pub async fn start_silent_store() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                while let Ok(Some(_)) = read_command(&mut reader).await {}
            });
        }
    });
    addr
}

/// Answers every command with the raw `reply` bytes, on every connection.
///
/// With `hang_up`, the connection is closed right after the first reply.
pub async fn start_scripted_store(reply: &'static [u8], hang_up: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut reader = BufReader::new(read);
                while let Ok(Some(_)) = read_command(&mut reader).await {
                    if write.write_all(reply).await.is_err() || hang_up {
                        return;
                    }
                }
            });
        }
    });
    addr
}

/// Holds replies until `batch` commands have arrived on the connection, then
/// answers each GET with its own key, in arrival order.
pub async fn start_batching_store(batch: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut reader = BufReader::new(read);
                let mut keys = Vec::with_capacity(batch);
                while let Ok(Some(args)) = read_command(&mut reader).await {
                    keys.push(args[1].clone());
                    if keys.len() < batch {
                        continue;
                    }
                    for key in keys.drain(..) {
                        let reply = format!("${}\r\n{}\r\n", key.len(), key);
                        if write.write_all(reply.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    addr
}

async fn read_command<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<String>>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let count = parse_header(&line, '*')?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await?;
        let len = parse_header(&line, '$')?;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data).await?;
        data.truncate(len);
        args.push(String::from_utf8(data).map_err(|_| invalid("utf8"))?);
    }
    Ok(Some(args))
}

fn parse_header(line: &str, prefix: char) -> io::Result<usize> {
    line.trim_end()
        .strip_prefix(prefix)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| invalid("bad header"))
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

// == Event Helpers ==
/// Waits (up to 5s) for the next event matching `pred`.
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<ConnectionEvent>, pred: F) -> ConnectionEvent
where
    F: Fn(&ConnectionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for connection event")
}

pub fn is_error(event: &ConnectionEvent) -> bool {
    matches!(event, ConnectionEvent::Error(_))
}

/// Gives spawned tasks a moment to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
