//! Clients that asked to have alarm events pushed to them.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error};

use alarm_protocol::DaemonMessage;

/// Maximum number of concurrent event subscribers
pub const MAX_SUBSCRIBERS: usize = 10;

/// Write half of a client socket, shared between its connection task and the
/// event forwarder.
pub type ClientWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Writes `json` plus a newline and flushes, bounded by `limit`.
pub async fn write_line(writer: &ClientWriter, json: &str, limit: Duration) -> io::Result<()> {
    let mut writer = writer.lock().await;
    let write = async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    };
    match tokio::time::timeout(limit, write).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "client write timed out")),
    }
}

/// Subscribed clients keyed by connection number.
///
/// Client ids come from the client and may collide; connection numbers are
/// assigned by the server and never repeat.
#[derive(Clone)]
pub struct Subscribers {
    clients: Arc<RwLock<HashMap<u64, ClientWriter>>>,
    write_timeout: Duration,
}

impl Subscribers {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            clients: Arc::default(),
            write_timeout,
        }
    }

    /// Writes `greeting()` to the connection and then adds it, with
    /// publishing held off in between. A connection already subscribed
    /// gets its writer replaced.
    ///
    /// Events published once `join` holds the set reach the client after the
    /// greeting. Returns `Ok(false)` without writing anything when
    /// the limit is reached.
    pub async fn join<F, Fut>(
        &self,
        connection: u64,
        writer: ClientWriter,
        greeting: F,
    ) -> io::Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DaemonMessage>,
    {
        let mut clients = self.clients.write().await;
        if clients.len() >= MAX_SUBSCRIBERS && !clients.contains_key(&connection) {
            return Ok(false);
        }

        let json = serde_json::to_string(&greeting().await)?;
        write_line(&writer, &json, self.write_timeout).await?;
        clients.insert(connection, writer);
        Ok(true)
    }

    pub async fn remove(&self, connection: u64) -> bool {
        self.clients.write().await.remove(&connection).is_some()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.clients.write().await.clear();
    }

    /// Pushes `message` to every subscriber. Clients whose write fails are
    /// dropped from the set.
    pub async fn publish(&self, message: &DaemonMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to encode event");
                return;
            }
        };

        let mut dead = Vec::new();
        {
            let clients = self.clients.read().await;
            for (&connection, writer) in clients.iter() {
                if let Err(e) = write_line(writer, &json, self.write_timeout).await {
                    debug!(connection, error = %e, "Event push failed");
                    dead.push(connection);
                }
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.write().await;
            for connection in dead {
                clients.remove(&connection);
                debug!(connection, "Dropped unreachable subscriber");
            }
        }
    }
}
