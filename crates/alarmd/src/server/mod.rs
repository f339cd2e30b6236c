//! Unix socket front end of the daemon.
//!
//! Each accepted stream gets its own [`ClientConnection`] task. A single
//! forwarder task turns registry events into [`DaemonMessage`]s and pushes
//! them to every subscribed client. Cancelling the shutdown token stops
//! accepting, stops forwarding and removes the socket file.

mod connection;
mod subscribers;

pub use connection::{ClientConnection, ConnectionError};
pub use subscribers::{ClientWriter, Subscribers, MAX_SUBSCRIBERS};

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use alarm_protocol::DaemonMessage;

use crate::registry::AlarmEvent;
use crate::scheduler::AlarmScheduler;

pub struct DaemonServer {
    socket_path: PathBuf,
    scheduler: AlarmScheduler,
    shutdown: CancellationToken,
    accepted: AtomicU64,
    subscribers: Subscribers,
}

impl DaemonServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        scheduler: AlarmScheduler,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            scheduler,
            shutdown,
            accepted: AtomicU64::new(0),
            subscribers: Subscribers::new(connection::WRITE_TIMEOUT),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accepts clients until the shutdown token is cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        info!(socket = %self.socket_path.display(), "Listening");

        self.spawn_event_forwarder();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => self.spawn_client(stream),
                    Err(e) => error!(error = %e, "Accept failed"),
                },
            }
        }

        self.cleanup().await;
        Ok(())
    }

    /// Binds the listener, replacing a socket file left by an earlier run.
    fn bind(&self) -> Result<UnixListener, ServerError> {
        let path = &self.socket_path;
        let bind_error = |source: io::Error| ServerError::Bind {
            path: path.clone(),
            source,
        };

        match std::fs::remove_file(path) {
            Ok(()) => debug!(socket = %path.display(), "Removed stale socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(bind_error(e)),
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(bind_error)?;
        }

        UnixListener::bind(path).map_err(bind_error)
    }

    fn spawn_client(&self, stream: UnixStream) {
        let number = self.accepted.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = stream.into_split();
        let connection = ClientConnection::new(
            reader,
            writer,
            self.scheduler.clone(),
            self.subscribers.clone(),
            number,
        );
        tokio::spawn(connection.serve());
    }

    fn spawn_event_forwarder(&self) {
        let mut events = self.scheduler.subscribe();
        let subscribers = self.subscribers.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => subscribers.publish(&event_message(&event)).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event forwarder fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Event forwarder stopped");
        });
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.len().await
    }

    async fn cleanup(&self) {
        self.subscribers.clear().await;

        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                socket = %self.socket_path.display(),
                error = %e,
                "Failed to remove socket file"
            ),
        }
        info!("Server stopped");
    }
}

/// The message a subscriber receives for a registry event.
pub fn event_message(event: &AlarmEvent) -> DaemonMessage {
    match event {
        AlarmEvent::Scheduled { alarm } => DaemonMessage::alarm_scheduled(alarm.clone()),
        AlarmEvent::Fired { alarm, next } => DaemonMessage::alarm_fired(alarm.clone(), next.clone()),
        AlarmEvent::Cancelled { alarm } => DaemonMessage::alarm_cancelled(alarm.clone()),
        AlarmEvent::NoticeAdded { text } => DaemonMessage::notice_added(text.clone()),
        AlarmEvent::NoticesCleared { cleared } => DaemonMessage::notices_cleared(*cleared),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("cannot listen on {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
