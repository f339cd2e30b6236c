//! One client connection.
//!
//! The first line must be a `connect` carrying a compatible protocol
//! version. After that every line is a request answered by exactly one
//! reply, except `unsubscribe` and `disconnect` which are silent. A line
//! that does not parse is answered with a `protocol` error and the
//! connection stays open.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use alarm_protocol::{error_code, ClientMessage, DaemonMessage, MessageType, ProtocolVersion};

use super::subscribers::{write_line, ClientWriter, Subscribers, MAX_SUBSCRIBERS};
use crate::scheduler::{AlarmScheduler, SchedulerError};

/// Longest request line accepted.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Unsubscribed clients silent for this long are dropped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

pub(crate) const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

enum Flow {
    Continue,
    Close,
}

/// Serves a single client until it goes away.
pub struct ClientConnection {
    lines: BufReader<OwnedReadHalf>,
    writer: ClientWriter,
    scheduler: AlarmScheduler,
    subscribers: Subscribers,
    client_id: Option<String>,
    subscribed: bool,
    number: u64,
}

impl ClientConnection {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        scheduler: AlarmScheduler,
        subscribers: Subscribers,
        number: u64,
    ) -> Self {
        Self {
            lines: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            scheduler,
            subscribers,
            client_id: None,
            subscribed: false,
            number,
        }
    }

    /// Handshakes, then answers requests until the client leaves.
    ///
    /// Returns the client id when the handshake succeeded. A subscribed
    /// client is removed from the subscriber set before returning.
    pub async fn serve(mut self) -> Option<String> {
        if let Err(e) = self.handshake().await {
            warn!(connection = self.number, error = %e, "Handshake failed");
            return None;
        }
        info!(client_id = ?self.client_id, "Client connected");

        if let Err(e) = self.serve_requests().await {
            debug!(client_id = ?self.client_id, error = %e, "Connection ended");
        }

        if self.subscribed {
            self.subscribers.remove(self.number).await;
        }
        info!(client_id = ?self.client_id, "Client disconnected");
        self.client_id
    }

    async fn handshake(&mut self) -> Result<(), ConnectionError> {
        let request = match timeout(IDLE_TIMEOUT, self.next_request()).await {
            Ok(Ok(Some(request))) => request,
            Ok(Ok(None)) => return Err(ConnectionError::Closed),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ConnectionError::Idle),
        };

        let client = request.protocol_version;
        let server = ProtocolVersion::CURRENT;
        if !client.is_compatible_with(&server) {
            warn!(client_version = %client, server_version = %server, "Protocol version mismatch");
            self.reply(DaemonMessage::rejected(&format!(
                "Client protocol {client} is not compatible with daemon protocol {server}"
            )))
            .await?;
            return Err(ConnectionError::Incompatible { client, server });
        }

        let client_id = match request.message {
            MessageType::Connect { client_id } => {
                client_id.unwrap_or_else(|| format!("client-{}", self.number))
            }
            other => {
                self.reply(DaemonMessage::error_with_code(
                    "The first message must be 'connect'",
                    error_code::PROTOCOL,
                ))
                .await?;
                return Err(ConnectionError::HandshakeExpected(format!("{other:?}")));
            }
        };

        self.client_id = Some(client_id.clone());
        self.reply(DaemonMessage::connected(client_id)).await
    }

    async fn serve_requests(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Watchers may stay silent for as long as they watch
            let next = if self.subscribed {
                Ok(self.next_request().await)
            } else {
                timeout(IDLE_TIMEOUT, self.next_request()).await
            };

            let request = match next {
                Ok(Ok(Some(request))) => request,
                Ok(Ok(None)) => return Ok(()),
                Ok(Err(ConnectionError::Malformed(reason))) => {
                    debug!(client_id = ?self.client_id, reason = %reason, "Malformed request");
                    self.reply(DaemonMessage::error_with_code(
                        &format!("Malformed request: {reason}"),
                        error_code::PROTOCOL,
                    ))
                    .await?;
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(ConnectionError::Idle),
            };

            if let Flow::Close = self.dispatch(request.message).await? {
                return Ok(());
            }
        }
    }

    async fn dispatch(&mut self, message: MessageType) -> Result<Flow, ConnectionError> {
        let reply = match message {
            MessageType::CreateAlarm { request } => {
                debug!(
                    client_id = ?self.client_id,
                    description = %request.description,
                    repeat = request.repeat,
                    "Create alarm request"
                );
                let result = self
                    .scheduler
                    .submit(&request.description, request.to_spec())
                    .await;
                reply_or_error(result, DaemonMessage::alarm_scheduled)
            }
            MessageType::CancelAlarm { description } => {
                let result = self.scheduler.cancel(&description).await;
                reply_or_error(result, DaemonMessage::alarm_cancelled)
            }
            MessageType::ClearNotices => {
                let result = self.scheduler.clear_notices().await;
                reply_or_error(result, DaemonMessage::notices_cleared)
            }
            MessageType::ListAlarms => alarm_list(&self.scheduler).await,
            MessageType::Subscribe => {
                self.subscribe().await?;
                return Ok(Flow::Continue);
            }
            MessageType::Unsubscribe => {
                self.subscribers.remove(self.number).await;
                self.subscribed = false;
                return Ok(Flow::Continue);
            }
            MessageType::Ping { seq } => DaemonMessage::pong(seq),
            MessageType::Connect { .. } => {
                DaemonMessage::error_with_code("Already connected", error_code::PROTOCOL)
            }
            MessageType::Disconnect => {
                debug!(client_id = ?self.client_id, "Client said goodbye");
                return Ok(Flow::Close);
            }
        };

        self.reply(reply).await?;
        Ok(Flow::Continue)
    }

    /// Answers with the current state and registers for event pushes.
    ///
    /// The state reply is written before any pushed event, and nothing
    /// published after the snapshot is missed.
    async fn subscribe(&mut self) -> Result<(), ConnectionError> {
        let scheduler = self.scheduler.clone();
        let joined = self
            .subscribers
            .join(self.number, Arc::clone(&self.writer), || async move {
                alarm_list(&scheduler).await
            })
            .await?;

        if !joined {
            warn!(client_id = ?self.client_id, "Subscriber limit reached");
            return self
                .reply(DaemonMessage::error(&format!(
                    "Too many subscribers (max: {MAX_SUBSCRIBERS})"
                )))
                .await;
        }

        self.subscribed = true;
        debug!(client_id = ?self.client_id, connection = self.number, "Client subscribed");
        Ok(())
    }

    /// Reads the next request line; `None` at end of stream.
    async fn next_request(&mut self) -> Result<Option<ClientMessage>, ConnectionError> {
        let mut line = String::new();
        let limit = (MAX_LINE_BYTES + 1) as u64;
        let read = (&mut self.lines).take(limit).read_line(&mut line).await?;

        if read == 0 {
            return Ok(None);
        }
        if read > MAX_LINE_BYTES {
            return Err(ConnectionError::LineTooLong {
                max: MAX_LINE_BYTES,
            });
        }

        serde_json::from_str(line.trim())
            .map(Some)
            .map_err(|e| ConnectionError::Malformed(e.to_string()))
    }

    async fn reply(&self, message: DaemonMessage) -> Result<(), ConnectionError> {
        let json =
            serde_json::to_string(&message).map_err(|e| ConnectionError::Encode(e.to_string()))?;
        write_line(&self.writer, &json, WRITE_TIMEOUT).await?;
        Ok(())
    }
}

async fn alarm_list(scheduler: &AlarmScheduler) -> DaemonMessage {
    let snapshot = scheduler.snapshot().await;
    DaemonMessage::alarm_list(snapshot.alarms, snapshot.notices)
}

fn reply_or_error<T>(
    result: Result<T, SchedulerError>,
    reply: impl FnOnce(T) -> DaemonMessage,
) -> DaemonMessage {
    match result {
        Ok(value) => reply(value),
        Err(e) => error_reply(&e),
    }
}

fn error_reply(err: &SchedulerError) -> DaemonMessage {
    DaemonMessage::error_with_code(&err.to_string(), err.code())
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("client protocol {client} is not compatible with {server}")]
    Incompatible {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("expected connect, got {0}")]
    HandshakeExpected(String),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request line longer than {max} bytes")]
    LineTooLong { max: usize },

    #[error("failed to encode reply: {0}")]
    Encode(String),

    #[error("client closed the connection")]
    Closed,

    #[error("client idle for too long")]
    Idle,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryError;
    use alarm_core::DomainError;

    #[test]
    fn test_incompatible_display() {
        let err = ConnectionError::Incompatible {
            client: ProtocolVersion::new(2, 0),
            server: ProtocolVersion::new(1, 0),
        };
        assert_eq!(
            err.to_string(),
            "client protocol 2.0 is not compatible with 1.0"
        );
    }

    #[test]
    fn test_error_reply_carries_code() {
        let err = SchedulerError::Registry(RegistryError::NotFound("Gym".to_string()));
        match error_reply(&err) {
            DaemonMessage::Error { message, code } => {
                assert!(message.contains("Gym"));
                assert_eq!(code.as_deref(), Some(error_code::NOT_FOUND));
            }
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_reply_or_error() {
        let ok = reply_or_error(Ok(3), DaemonMessage::notices_cleared);
        assert!(matches!(ok, DaemonMessage::NoticesCleared { cleared: 3 }));

        let err = reply_or_error(
            Err::<usize, _>(SchedulerError::InvalidRequest(DomainError::EmptyDescription)),
            DaemonMessage::notices_cleared,
        );
        assert!(matches!(
            err,
            DaemonMessage::Error { code: Some(ref c), .. } if c == error_code::INVALID_SCHEDULE
        ));
    }
}
