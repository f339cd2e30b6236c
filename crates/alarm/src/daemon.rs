//! Daemon management for the alarm client.
//!
//! Checks whether `alarmd` is running and starts it in the background if
//! needed.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{debug, info};

use crate::client::SOCKET_ENV;
use crate::error::{ClientError, Result};

/// Directory under the XDG state dir shared with `alarmd`.
pub const APP_DIR: &str = "smart-alarm";

/// Returns the path to the daemon PID file.
pub fn pid_file_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
        .join("alarmd.pid")
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Checks if a process with the given PID is running.
pub fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Checks if the daemon is currently running.
pub fn is_daemon_running() -> bool {
    read_pid(&pid_file_path()).is_some_and(is_process_running)
}

/// `alarmd`, preferring the binary next to this one.
fn daemon_binary() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("alarmd")))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from("alarmd"))
}

/// `alarmd start -d` bound to `socket_path`.
fn daemon_command(binary: &Path, socket_path: &Path) -> Command {
    let mut command = Command::new(binary);
    command
        .args(["start", "-d"])
        .env(SOCKET_ENV, socket_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    command
}

fn spawn_daemon(socket_path: &Path) -> std::io::Result<()> {
    let binary = daemon_binary();
    debug!(path = %binary.display(), socket = %socket_path.display(), "Starting daemon");
    daemon_command(&binary, socket_path).spawn()?;
    Ok(())
}

/// Ensures the daemon is running and its socket exists, starting it if necessary.
///
/// # Errors
/// - `DaemonConnection` if the daemon could not be spawned or its socket did
///   not appear within 3 seconds
pub async fn ensure_daemon_running(socket_path: &Path) -> Result<()> {
    if is_daemon_running() && socket_path.exists() {
        debug!("Daemon already running");
        return Ok(());
    }

    info!("Daemon not running, starting it");
    spawn_daemon(socket_path)
        .map_err(|e| ClientError::DaemonConnection(format!("failed to start alarmd: {e}")))?;

    for attempt in 1..=30 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if socket_path.exists() {
            info!(attempts = attempt, "Daemon started");
            return Ok(());
        }
    }

    Err(ClientError::DaemonConnection(
        "alarmd did not start within 3 seconds".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_file_path() {
        let path = pid_file_path();
        assert!(path.ends_with("smart-alarm/alarmd.pid"));
    }

    #[test]
    fn test_is_process_running_current() {
        assert!(is_process_running(std::process::id()));
    }

    #[test]
    fn test_is_process_running_nonexistent() {
        assert!(!is_process_running(999_999_999));
    }

    #[test]
    fn test_daemon_command_carries_socket() {
        let command = daemon_command(Path::new("/usr/bin/alarmd"), Path::new("/run/x.sock"));

        assert_eq!(command.get_program(), "/usr/bin/alarmd");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, ["start", "-d"]);
        let socket = command
            .get_envs()
            .find(|(key, _)| *key == SOCKET_ENV)
            .and_then(|(_, value)| value);
        assert_eq!(socket, Some(std::ffi::OsStr::new("/run/x.sock")));
    }

    #[test]
    fn test_read_pid_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarmd.pid");
        std::fs::write(&path, "4242\n").unwrap();
        assert_eq!(read_pid(&path), Some(4242));

        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(read_pid(&path), None);
    }
}
