//! Daemon configuration.
//!
//! Loaded from `$XDG_CONFIG_HOME/smart-alarm/config.toml` unless a path is
//! given. Every field has a default, so a missing file is not an error.
//!
//! ```toml
//! socket_path = "/tmp/smart-alarm.sock"
//! speech_command = ["espeak", "-s", "150"]
//! announce_timeout_secs = 30
//! event_log = "/home/me/.local/state/smart-alarm/smart_alarm.log"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::notifier::{LogNotifier, Notifier, SpeechNotifier, DEFAULT_SPEECH_COMMAND};

/// Default Unix socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/smart-alarm.sock";

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "ALARM_SOCKET";

/// Application directory name under the XDG config and state dirs.
pub const APP_DIR: &str = "smart-alarm";

const CONFIG_FILE: &str = "config.toml";
const EVENT_LOG_FILE: &str = "smart_alarm.log";
const DEFAULT_ANNOUNCE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,

    /// Program and leading arguments; the message is appended. Empty
    /// disables speech and announcements are only logged.
    pub speech_command: Vec<String>,

    pub announce_timeout_secs: u64,

    /// Event log file; `None` disables it.
    pub event_log: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            speech_command: vec![DEFAULT_SPEECH_COMMAND.to_string()],
            announce_timeout_secs: DEFAULT_ANNOUNCE_TIMEOUT_SECS,
            event_log: state_dir().map(|dir| dir.join(EVENT_LOG_FILE)),
        }
    }
}

impl DaemonConfig {
    /// Loads the config from `path`, or from the default location.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error. `ALARM_SOCKET` is applied afterwards.
    ///
    /// # Errors
    /// - `ConfigError::Read` if the file exists but cannot be read
    /// - `ConfigError::Parse` if the TOML is invalid
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (default_config_path(), false),
        };

        let mut config = match path {
            Some(path) if explicit || path.exists() => {
                let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                debug!(path = %path.display(), "Loaded config file");
                Self::from_toml_str(&content).map_err(|source| ConfigError::Parse { path, source })?
            }
            _ => Self::default(),
        };

        config.apply_socket_override(std::env::var_os(SOCKET_ENV).map(PathBuf::from));
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Replaces the socket path when an override is present and non-empty.
    pub fn apply_socket_override(&mut self, socket: Option<PathBuf>) {
        if let Some(socket) = socket.filter(|s| !s.as_os_str().is_empty()) {
            debug!(socket = %socket.display(), "Socket path overridden");
            self.socket_path = socket;
        }
    }

    pub fn announce_timeout(&self) -> Duration {
        Duration::from_secs(self.announce_timeout_secs.max(1))
    }

    /// Builds the notifier the config asks for.
    pub fn build_notifier(&self) -> Arc<dyn Notifier> {
        match SpeechNotifier::from_command(&self.speech_command) {
            Ok(speech) => Arc::new(speech),
            Err(e) => {
                warn!(error = %e, "Speech disabled, announcements will only be logged");
                Arc::new(LogNotifier)
            }
        }
    }
}

/// `$XDG_STATE_HOME/smart-alarm` (falling back to the platform equivalent).
pub fn state_dir() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join(APP_DIR))
}

/// `$XDG_CONFIG_HOME/smart-alarm/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DaemonConfig::from_toml_str("").unwrap();
        assert_eq!(config.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert_eq!(config.speech_command, vec!["espeak".to_string()]);
        assert_eq!(config.announce_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_config_overrides_fields() {
        let config = DaemonConfig::from_toml_str(
            r#"
            socket_path = "/run/user/1000/alarm.sock"
            speech_command = ["say", "-v", "Alex"]
            announce_timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/run/user/1000/alarm.sock"));
        assert_eq!(config.speech_command.len(), 3);
        assert_eq!(config.announce_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(DaemonConfig::from_toml_str("announce_timeout_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "event_log = \"/tmp/alarm-events.log\"").unwrap();

        let config = DaemonConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.event_log, Some(PathBuf::from("/tmp/alarm-events.log")));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = DaemonConfig::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_socket_override() {
        let mut config = DaemonConfig::default();
        config.apply_socket_override(Some(PathBuf::new()));
        assert_eq!(config.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));

        config.apply_socket_override(Some(PathBuf::from("/tmp/other.sock")));
        assert_eq!(config.socket_path, PathBuf::from("/tmp/other.sock"));
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let config = DaemonConfig {
            announce_timeout_secs: 0,
            ..DaemonConfig::default()
        };
        assert_eq!(config.announce_timeout(), Duration::from_secs(1));
    }
}
