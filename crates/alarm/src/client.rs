//! Daemon connection client.
//!
//! `DaemonClient` is a single request/response connection: each request
//! writes one JSON line and reads one reply. After `subscribe()` the daemon
//! also pushes events on the same connection, so a subscribed client should
//! only call `next_event()`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use alarm_core::{AlarmId, AlarmView};
use alarm_protocol::{ClientMessage, DaemonMessage, ProtocolVersion, RawAlarmRequest};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::daemon::APP_DIR;
use crate::error::{ClientError, Result};

/// Default daemon socket, shared with `alarmd`.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/smart-alarm.sock";

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "ALARM_SOCKET";

const CONFIG_FILE: &str = "config.toml";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path to the Unix socket where the daemon listens.
    pub socket_path: PathBuf,

    /// How long to wait for the daemon to answer a request.
    ///
    /// Creating or cancelling an alarm waits for its announcement to be
    /// spoken, so this is well above the socket round trip.
    pub response_timeout: Duration,

    /// Identifier sent in the handshake; the daemon assigns one when `None`.
    pub client_id: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            response_timeout: Duration::from_secs(60),
            client_id: None,
        }
    }
}

impl ClientConfig {
    /// Default configuration with the socket `alarmd` would bind.
    ///
    /// The socket comes from `ALARM_SOCKET`, then `socket_path` in the
    /// daemon's config file (`config_file`, or the default location), then
    /// [`DEFAULT_SOCKET_PATH`].
    pub fn load(config_file: Option<&Path>) -> Self {
        let from_file = config_file
            .map(Path::to_path_buf)
            .or_else(default_config_path)
            .and_then(|path| socket_from_file(&path));
        Self::with_socket(std::env::var_os(SOCKET_ENV).map(PathBuf::from), from_file)
    }

    fn with_socket(from_env: Option<PathBuf>, from_file: Option<PathBuf>) -> Self {
        let mut config = Self::default();
        let socket = [from_env, from_file]
            .into_iter()
            .flatten()
            .find(|s| !s.as_os_str().is_empty());
        if let Some(socket) = socket {
            config.socket_path = socket;
        }
        config
    }
}

/// The one daemon setting the client shares.
#[derive(Debug, Deserialize)]
struct SharedConfig {
    socket_path: Option<PathBuf>,
}

/// `$XDG_CONFIG_HOME/smart-alarm/config.toml`, the file `alarmd` reads.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

fn socket_from_file(path: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<SharedConfig>(&content) {
        Ok(shared) => shared.socket_path,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
            None
        }
    }
}

// ============================================================================
// Alarm State
// ============================================================================

/// The client's copy of the daemon's pending alarms and notices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmState {
    pub alarms: Vec<AlarmView>,
    pub notices: Vec<String>,
}

impl AlarmState {
    pub fn new(alarms: Vec<AlarmView>, notices: Vec<String>) -> Self {
        Self { alarms, notices }
    }

    pub fn pending_texts(&self) -> Vec<&str> {
        self.alarms.iter().map(|a| a.display_text.as_str()).collect()
    }

    /// Folds a daemon event into the local copy.
    ///
    /// Returns false for messages that are not events.
    pub fn apply(&mut self, message: &DaemonMessage) -> bool {
        match message {
            DaemonMessage::AlarmList { alarms, notices } => {
                self.alarms = alarms.clone();
                self.notices = notices.clone();
            }
            DaemonMessage::AlarmScheduled { alarm } => self.insert(alarm.clone()),
            DaemonMessage::AlarmCancelled { alarm } => self.remove(alarm.id),
            DaemonMessage::AlarmFired { alarm, next } => {
                self.remove(alarm.id);
                if let Some(next) = next {
                    self.insert(next.clone());
                }
            }
            DaemonMessage::NoticeAdded { text } => self.notices.push(text.clone()),
            DaemonMessage::NoticesCleared { .. } => self.notices.clear(),
            _ => return false,
        }
        true
    }

    fn insert(&mut self, alarm: AlarmView) {
        self.remove(alarm.id);
        // Same order as the daemon's list: by id, which is scheduling order
        let at = self.alarms.partition_point(|a| a.id < alarm.id);
        self.alarms.insert(at, alarm);
    }

    fn remove(&mut self, id: AlarmId) {
        self.alarms.retain(|a| a.id != id);
    }
}

// ============================================================================
// Daemon Client
// ============================================================================

/// Connection to the alarm daemon.
///
/// # Example
///
/// ```rust,ignore
/// use alarm_cli::{ClientConfig, DaemonClient};
///
/// let mut client = DaemonClient::connect(ClientConfig::load(None)).await?;
/// for text in client.list().await?.pending_texts() {
///     println!("{text}");
/// }
/// ```
pub struct DaemonClient {
    config: ClientConfig,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    client_id: String,
    next_seq: u64,
}

impl DaemonClient {
    /// Connects to the daemon socket and performs the handshake.
    ///
    /// # Errors
    /// - `DaemonConnection` if the socket is missing or refuses the connection
    /// - `VersionMismatch` / `Rejected` if the daemon refuses the handshake
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        if !config.socket_path.exists() {
            return Err(ClientError::DaemonConnection(format!(
                "socket {} not found (is alarmd running?)",
                config.socket_path.display()
            )));
        }

        let stream = match timeout(config.response_timeout, UnixStream::connect(&config.socket_path))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ClientError::DaemonConnection(e.to_string())),
            Err(_) => return Err(ClientError::Timeout),
        };
        debug!(socket_path = %config.socket_path.display(), "Connected to daemon socket");

        let (reader, writer) = stream.into_split();
        let mut client = Self {
            config,
            reader: BufReader::new(reader),
            writer,
            client_id: String::new(),
            next_seq: 1,
        };
        client.handshake().await?;
        Ok(client)
    }

    /// Client ID assigned in the handshake.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn handshake(&mut self) -> Result<()> {
        self.send(&ClientMessage::connect(self.config.client_id.clone()))
            .await?;

        match self.read_reply().await? {
            DaemonMessage::Connected {
                protocol_version,
                client_id,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(ClientError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        daemon_version: protocol_version.to_string(),
                    });
                }
                info!(client_id = %client_id, protocol_version = %protocol_version, "Handshake complete");
                self.client_id = client_id;
                Ok(())
            }
            DaemonMessage::Rejected {
                reason,
                protocol_version,
            } => {
                if ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    Err(ClientError::Rejected(reason))
                } else {
                    Err(ClientError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        daemon_version: protocol_version.to_string(),
                    })
                }
            }
            DaemonMessage::Error { message, code } => Err(ClientError::Daemon { message, code }),
            other => Err(unexpected(&other)),
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Asks the daemon to schedule an alarm.
    pub async fn create_alarm(&mut self, request: RawAlarmRequest) -> Result<AlarmView> {
        match self.request(ClientMessage::create_alarm(request)).await? {
            DaemonMessage::AlarmScheduled { alarm } => Ok(alarm),
            other => Err(unexpected(&other)),
        }
    }

    /// Cancels a pending alarm by description.
    ///
    /// An unknown description comes back as a `Daemon` error with code
    /// `not_found`.
    pub async fn cancel_alarm(&mut self, description: &str) -> Result<AlarmView> {
        match self.request(ClientMessage::cancel_alarm(description)).await? {
            DaemonMessage::AlarmCancelled { alarm } => Ok(alarm),
            other => Err(unexpected(&other)),
        }
    }

    /// Empties the notice list, returning how many notices were removed.
    pub async fn clear_notices(&mut self) -> Result<usize> {
        match self.request(ClientMessage::clear_notices()).await? {
            DaemonMessage::NoticesCleared { cleared } => Ok(cleared),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn list(&mut self) -> Result<AlarmState> {
        match self.request(ClientMessage::list_alarms()).await? {
            DaemonMessage::AlarmList { alarms, notices } => Ok(AlarmState::new(alarms, notices)),
            other => Err(unexpected(&other)),
        }
    }

    /// Round-trips a ping and returns the elapsed time.
    pub async fn ping(&mut self) -> Result<Duration> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let started = Instant::now();

        match self.request(ClientMessage::ping(seq)).await? {
            DaemonMessage::Pong { seq: got } if got == seq => Ok(started.elapsed()),
            other => Err(unexpected(&other)),
        }
    }

    /// Subscribes to events and returns the state at subscription time.
    pub async fn subscribe(&mut self) -> Result<AlarmState> {
        match self.request(ClientMessage::subscribe()).await? {
            DaemonMessage::AlarmList { alarms, notices } => Ok(AlarmState::new(alarms, notices)),
            other => Err(unexpected(&other)),
        }
    }

    /// Waits for the next pushed message. `None` when the daemon hangs up.
    pub async fn next_event(&mut self) -> Result<Option<DaemonMessage>> {
        self.read_message().await
    }

    /// Says goodbye and closes the connection.
    pub async fn disconnect(mut self) -> Result<()> {
        self.send(&ClientMessage::disconnect()).await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    // ========================================================================
    // Wire
    // ========================================================================

    async fn request(&mut self, msg: ClientMessage) -> Result<DaemonMessage> {
        self.send(&msg).await?;
        match self.read_reply().await? {
            DaemonMessage::Error { message, code } => Err(ClientError::Daemon { message, code }),
            reply => Ok(reply),
        }
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<DaemonMessage> {
        match timeout(self.config.response_timeout, self.read_message()).await {
            Ok(Ok(Some(msg))) => Ok(msg),
            Ok(Ok(None)) => Err(ClientError::Disconnected),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ClientError::Timeout),
        }
    }

    async fn read_message(&mut self) -> Result<Option<DaemonMessage>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(serde_json::from_str(trimmed)?));
            }
        }
    }
}

fn unexpected(msg: &DaemonMessage) -> ClientError {
    ClientError::UnexpectedResponse(format!("{msg:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeDelta};
    use tokio::net::UnixListener;

    fn view(id: u64, description: &str, hours: i64) -> AlarmView {
        let fire_at = Local::now() + TimeDelta::hours(hours);
        AlarmView::new(AlarmId::new(id), description, fire_at, false, 1)
    }

    /// Accepts one connection and answers each request with the next scripted reply.
    async fn fake_daemon(replies: Vec<DaemonMessage>) -> (tempfile::TempDir, ClientConfig) {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("fake.sock");
        let listener = UnixListener::bind(&socket_path).unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            for reply in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    return;
                }
                let json = serde_json::to_string(&reply).unwrap();
                writer.write_all(json.as_bytes()).await.unwrap();
                writer.write_all(b"\n").await.unwrap();
            }
        });

        let config = ClientConfig {
            socket_path,
            response_timeout: Duration::from_secs(2),
            client_id: Some("test".to_string()),
        };
        (dir, config)
    }

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/smart-alarm.sock"));
        assert!(config.client_id.is_none());
    }

    #[test]
    fn test_socket_precedence() {
        let env = Some(PathBuf::from("/run/env.sock"));
        let file = Some(PathBuf::from("/run/file.sock"));

        let config = ClientConfig::with_socket(env.clone(), file.clone());
        assert_eq!(config.socket_path, PathBuf::from("/run/env.sock"));

        let config = ClientConfig::with_socket(None, file.clone());
        assert_eq!(config.socket_path, PathBuf::from("/run/file.sock"));

        // An empty ALARM_SOCKET counts as unset
        let config = ClientConfig::with_socket(Some(PathBuf::new()), file);
        assert_eq!(config.socket_path, PathBuf::from("/run/file.sock"));

        let config = ClientConfig::with_socket(None, None);
        assert_eq!(config.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
    }

    #[test]
    fn test_socket_from_daemon_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        std::fs::write(
            &path,
            "socket_path = \"/run/alarm.sock\"\nspeech_command = [\"espeak\"]\n",
        )
        .unwrap();
        assert_eq!(socket_from_file(&path), Some(PathBuf::from("/run/alarm.sock")));

        std::fs::write(&path, "announce_timeout_secs = 10\n").unwrap();
        assert_eq!(socket_from_file(&path), None);

        std::fs::write(&path, "socket_path = [").unwrap();
        assert_eq!(socket_from_file(&path), None);

        assert_eq!(socket_from_file(&dir.path().join("missing.toml")), None);
    }

    #[test]
    fn test_default_config_path() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("smart-alarm/config.toml"));
        }
    }

    #[tokio::test]
    async fn test_connect_missing_socket() {
        let config = ClientConfig {
            socket_path: PathBuf::from("/nonexistent/alarm.sock"),
            ..ClientConfig::default()
        };
        let result = DaemonClient::connect(config).await;
        assert!(matches!(result, Err(ClientError::DaemonConnection(_))));
    }

    #[tokio::test]
    async fn test_handshake_and_list() {
        let alarm = view(1, "Meeting", 2);
        let (_dir, config) = fake_daemon(vec![
            DaemonMessage::connected("test".to_string()),
            DaemonMessage::alarm_list(vec![alarm.clone()], vec!["hello".to_string()]),
        ])
        .await;

        let mut client = DaemonClient::connect(config).await.unwrap();
        assert_eq!(client.client_id(), "test");

        let state = client.list().await.unwrap();
        assert_eq!(state.alarms, vec![alarm]);
        assert_eq!(state.notices, vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_handshake_is_version_mismatch() {
        let (_dir, config) = fake_daemon(vec![DaemonMessage::Rejected {
            reason: "not compatible".to_string(),
            protocol_version: ProtocolVersion::new(9, 0),
        }])
        .await;

        let result = DaemonClient::connect(config).await;
        assert!(matches!(result, Err(ClientError::VersionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_daemon_error_keeps_code() {
        let (_dir, config) = fake_daemon(vec![
            DaemonMessage::connected("test".to_string()),
            DaemonMessage::error_with_code("no pending alarm matches 'Gym'", "not_found"),
        ])
        .await;

        let mut client = DaemonClient::connect(config).await.unwrap();
        let err = client.cancel_alarm("Gym").await.unwrap_err();
        assert_eq!(err.code(), Some("not_found"));
    }

    #[tokio::test]
    async fn test_unexpected_reply() {
        let (_dir, config) = fake_daemon(vec![
            DaemonMessage::connected("test".to_string()),
            DaemonMessage::pong(99),
        ])
        .await;

        let mut client = DaemonClient::connect(config).await.unwrap();
        let err = client.clear_notices().await.unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_daemon_hangup_is_disconnected() {
        let (_dir, config) = fake_daemon(vec![DaemonMessage::connected("test".to_string())]).await;

        let mut client = DaemonClient::connect(config).await.unwrap();
        let err = client.list().await.unwrap_err();
        assert!(matches!(err, ClientError::Disconnected));
    }

    #[test]
    fn test_state_apply_keeps_scheduling_order() {
        let mut state = AlarmState::default();
        let first = view(1, "First", 5);
        let second = view(2, "Second", 1);

        assert!(state.apply(&DaemonMessage::alarm_scheduled(second.clone())));
        assert!(state.apply(&DaemonMessage::alarm_scheduled(first.clone())));
        assert_eq!(state.alarms, vec![first.clone(), second.clone()]);

        assert!(state.apply(&DaemonMessage::alarm_cancelled(first)));
        assert_eq!(state.alarms, vec![second]);
    }

    #[test]
    fn test_state_apply_fired_with_next() {
        let mut state = AlarmState::default();
        let first = view(1, "Gym", 1);
        let next = view(2, "Gym", 1 + 24 * 7);

        state.apply(&DaemonMessage::alarm_scheduled(first.clone()));
        state.apply(&DaemonMessage::alarm_fired(first, Some(next.clone())));
        state.apply(&DaemonMessage::notice_added("fired"));
        assert_eq!(state.alarms, vec![next]);
        assert_eq!(state.notices, vec!["fired".to_string()]);

        state.apply(&DaemonMessage::notices_cleared(1));
        assert!(state.notices.is_empty());
        assert!(!state.apply(&DaemonMessage::pong(1)));
    }
}
