//! Best-effort event log file.
//!
//! Alarm creations, expirations, cancellations and notice clears are appended
//! as `YYYY-MM-DD HH:MM:SS message` lines. Writes go through a bounded
//! channel to a writer task; when the channel is full the line is dropped
//! with a warning rather than stalling a timer.

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lines that may wait for the writer before new ones are dropped.
pub const EVENT_LOG_BUFFER: usize = 256;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cheap-to-clone handle to the event log writer.
#[derive(Debug, Clone)]
pub struct EventLog {
    sender: Option<mpsc::Sender<String>>,
}

impl EventLog {
    /// Starts a writer task appending to `path`.
    ///
    /// The file and its parent directory are created on first write; open
    /// failures are logged and the line is lost.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (sender, receiver) = mpsc::channel(EVENT_LOG_BUFFER);
        tokio::spawn(write_lines(path, receiver));
        Self {
            sender: Some(sender),
        }
    }

    /// An event log that only traces.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    /// Records one event.
    pub fn log_event(&self, message: &str) {
        info!(target: "alarmd::events", "{message}");

        let Some(sender) = &self.sender else {
            return;
        };
        let line = format!("{} {message}\n", Local::now().format(TIMESTAMP_FORMAT));
        if let Err(e) = sender.try_send(line) {
            warn!(error = %e, "Event log line dropped");
        }
    }
}

async fn write_lines(path: PathBuf, mut receiver: mpsc::Receiver<String>) {
    while let Some(line) = receiver.recv().await {
        if let Err(e) = append(&path, &line).await {
            warn!(path = %path.display(), error = %e, "Failed to write event log");
        }
    }
    debug!(path = %path.display(), "Event log writer stopped");
}

async fn append(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}
