//! Spoken announcements.
//!
//! Announcements go through a single FIFO worker so a slow speech command
//! delays later announcements but never a timer task. Failures and timeouts
//! are logged and swallowed.

use std::fmt::Debug;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Default speech program, invoked as `espeak "<message>"`.
pub const DEFAULT_SPEECH_COMMAND: &str = "espeak";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}")]
    Failed { program: String, status: String },

    #[error("announcement timed out after {0:?}")]
    Timeout(Duration),

    #[error("no speech command configured")]
    NotConfigured,
}

// ============================================================================
// Notifier Trait
// ============================================================================

/// Delivers one human-readable message.
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    async fn announce(&self, message: &str) -> Result<(), NotifyError>;
}

/// Speaks messages by running an external command with the message as its
/// last argument.
#[derive(Debug, Clone)]
pub struct SpeechNotifier {
    program: String,
    args: Vec<String>,
}

impl SpeechNotifier {
    /// Builds a notifier from a command line such as `["espeak", "-s", "150"]`.
    ///
    /// # Errors
    /// - `NotifyError::NotConfigured` if the command line is empty
    pub fn from_command(command: &[String]) -> Result<Self, NotifyError> {
        let (program, args) = command.split_first().ok_or(NotifyError::NotConfigured)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Default for SpeechNotifier {
    fn default() -> Self {
        Self {
            program: DEFAULT_SPEECH_COMMAND.to_string(),
            args: Vec::new(),
        }
    }
}

#[async_trait]
impl Notifier for SpeechNotifier {
    async fn announce(&self, message: &str) -> Result<(), NotifyError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| NotifyError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(NotifyError::Failed {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

/// Writes announcements to the log only. Used when speech is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn announce(&self, message: &str) -> Result<(), NotifyError> {
        info!(message = %message, "Announcement");
        Ok(())
    }
}

// ============================================================================
// Queue Worker
// ============================================================================

struct Announcement {
    message: String,
    done: Option<oneshot::Sender<bool>>,
}

/// Cheap-to-clone handle to the announcement queue.
#[derive(Debug, Clone)]
pub struct NotifierHandle {
    sender: mpsc::UnboundedSender<Announcement>,
}

impl NotifierHandle {
    /// Queues a message and returns immediately.
    pub fn announce(&self, message: impl Into<String>) {
        let announcement = Announcement {
            message: message.into(),
            done: None,
        };
        if self.sender.send(announcement).is_err() {
            debug!("Notifier worker stopped, announcement dropped");
        }
    }

    /// Queues a message and waits until the worker has delivered it.
    ///
    /// Returns `true` on successful delivery. Failures and timeouts return
    /// `false` and are already logged by the worker.
    pub async fn announce_and_wait(&self, message: impl Into<String>) -> bool {
        let (tx, rx) = oneshot::channel();
        let announcement = Announcement {
            message: message.into(),
            done: Some(tx),
        };
        if self.sender.send(announcement).is_err() {
            debug!("Notifier worker stopped, announcement dropped");
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

/// Spawns the FIFO worker that feeds `notifier` one message at a time.
///
/// Each delivery is bounded by `timeout`. The worker exits when every
/// handle has been dropped.
pub fn spawn_notifier(notifier: Arc<dyn Notifier>, timeout: Duration) -> NotifierHandle {
    let (sender, mut receiver) = mpsc::unbounded_channel::<Announcement>();

    tokio::spawn(async move {
        while let Some(announcement) = receiver.recv().await {
            let delivered =
                match tokio::time::timeout(timeout, notifier.announce(&announcement.message)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        warn!(error = %e, message = %announcement.message, "Announcement failed");
                        false
                    }
                    Err(_) => {
                        warn!(
                            error = %NotifyError::Timeout(timeout),
                            message = %announcement.message,
                            "Announcement timed out"
                        );
                        false
                    }
                };

            if let Some(done) = announcement.done {
                let _ = done.send(delivered);
            }
        }
        debug!("Notifier worker stopped");
    });

    NotifierHandle { sender }
}

// ============================================================================
// Test Support
// ============================================================================

/// Notifier that records every message, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<std::sync::Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages delivered so far, in order.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn announce(&self, message: &str) -> Result<(), NotifyError> {
        if let Ok(mut guard) = self.messages.lock() {
            guard.push(message.to_string());
        }
        Ok(())
    }
}
