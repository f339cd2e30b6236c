//! alarmd - the smart-alarm daemon
//!
//! Keeps pending alarms, speaks announcements when they fire and serves
//! `alarm` clients over a Unix socket.
//!
//! # Usage
//!
//! ```bash
//! alarmd start                        # foreground
//! alarmd start -d                     # detach into the background
//! alarmd start --config ~/alarm.toml  # explicit config file
//! alarmd stop
//! alarmd status
//! ```

use std::fs::{self, File};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use alarmd::clock::SystemClock;
use alarmd::config::{self, DaemonConfig, APP_DIR};
use alarmd::event_log::EventLog;
use alarmd::server::DaemonServer;
use alarmd::spawn_scheduler;

/// How long `alarmd stop` waits for the daemon to exit.
const STOP_WAIT: Duration = Duration::from_secs(5);

/// alarmd - spoken one-shot and weekly alarms
#[derive(Parser, Debug)]
#[command(name = "alarmd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon
    Start {
        /// Detach from the terminal
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Config file (default: $XDG_CONFIG_HOME/smart-alarm/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Ask a running daemon to exit
    Stop,
    /// Report whether the daemon is running
    Status,
}

/// `alarmd.pid` in the state directory, shared with the `alarm` client.
struct PidFile {
    path: PathBuf,
}

impl PidFile {
    fn locate() -> Self {
        Self {
            path: state_dir().join("alarmd.pid"),
        }
    }

    /// PID of a live daemon. A file naming a dead process is removed.
    fn live_pid(&self) -> Option<u32> {
        let pid: u32 = fs::read_to_string(&self.path).ok()?.trim().parse().ok()?;
        if process_alive(pid) {
            Some(pid)
        } else {
            self.remove();
            None
        }
    }

    fn write_current(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create {}", dir.display()))?;
        }
        fs::write(&self.path, process::id().to_string())
            .with_context(|| format!("Cannot write {}", self.path.display()))
    }

    fn remove(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn state_dir() -> PathBuf {
    config::state_dir().unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR))
}

fn process_alive(pid: u32) -> bool {
    PathBuf::from("/proc").join(pid.to_string()).exists()
}

fn main() -> Result<()> {
    let command = Args::parse().command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
    });
    let pid_file = PidFile::locate();

    match command {
        Command::Start { daemon, config } => start(&pid_file, daemon, config),
        Command::Stop => stop(&pid_file),
        Command::Status => status(&pid_file),
    }
}

fn start(pid_file: &PidFile, detach: bool, config: Option<PathBuf>) -> Result<()> {
    if let Some(pid) = pid_file.live_pid() {
        eprintln!("alarmd is already running (PID {pid}); run 'alarmd stop' first.");
        process::exit(1);
    }

    // Config errors should reach the terminal, so load before detaching
    let config = DaemonConfig::load(config.as_deref())?;

    if detach {
        detach_from_terminal()?;
    }

    pid_file.write_current()?;
    let result = run_daemon(config);
    pid_file.remove();
    result
}

fn stop(pid_file: &PidFile) -> Result<()> {
    let Some(pid) = pid_file.live_pid() else {
        println!("alarmd is not running.");
        return Ok(());
    };

    println!("Stopping alarmd (PID {pid})...");
    send_sigterm(pid)?;

    let polls = STOP_WAIT.as_millis() / 100;
    for _ in 0..polls {
        if !process_alive(pid) {
            println!("alarmd stopped.");
            return Ok(());
        }
        thread::sleep(Duration::from_millis(100));
    }

    eprintln!("alarmd is still running after {}s.", STOP_WAIT.as_secs());
    process::exit(1);
}

fn status(pid_file: &PidFile) -> Result<()> {
    let Some(pid) = pid_file.live_pid() else {
        println!("alarmd is not running.");
        process::exit(1);
    };

    println!("alarmd is running (PID {pid})");
    if let Ok(config) = DaemonConfig::load(None) {
        println!("Socket: {}", config.socket_path.display());
        if let Some(log) = config.event_log {
            println!("Event log: {}", log.display());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> Result<()> {
    let pid = libc::pid_t::try_from(pid).context("PID out of range")?;
    // SAFETY: kill(2) has no memory-safety preconditions
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        return Err(anyhow!("Failed to signal PID {pid}"));
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> Result<()> {
    Err(anyhow!("'alarmd stop' needs a Unix system"))
}

/// Forks into the background with stdout and stderr going to `alarmd.log`.
fn detach_from_terminal() -> Result<()> {
    let dir = state_dir();
    fs::create_dir_all(&dir).with_context(|| format!("Cannot create {}", dir.display()))?;

    let log = File::create(dir.join("alarmd.log")).context("Cannot create alarmd.log")?;
    let log_err = log.try_clone().context("Cannot duplicate log handle")?;

    daemonize::Daemonize::new()
        .working_directory("/")
        .stdout(log)
        .stderr(log_err)
        .start()
        .context("Failed to detach")?;
    Ok(())
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    let mut filter = EnvFilter::from_default_env();
    for directive in ["alarmd=info", "alarm_core=info", "alarm_protocol=info"] {
        filter = filter.add_directive(directive.parse::<Directive>()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        socket = %config.socket_path.display(),
        "alarmd starting"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let event_log = match config.event_log.as_deref() {
        Some(path) => EventLog::open(path),
        None => EventLog::disabled(),
    };

    let scheduler = spawn_scheduler(
        config.build_notifier(),
        config.announce_timeout(),
        event_log,
        Arc::new(SystemClock),
    );

    let served = DaemonServer::new(&config.socket_path, scheduler.clone(), shutdown)
        .run()
        .await;

    // Pending timers are dropped; alarms do not survive a restart
    scheduler.shutdown().await;

    match served {
        Ok(()) => {
            info!("alarmd stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Server failed");
            Err(e.into())
        }
    }
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    match termination_signal().await {
        Ok(name) => info!(signal = name, "Shutting down"),
        Err(e) => warn!(error = %e, "Cannot listen for signals, shutting down"),
    }
    shutdown.cancel();
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    Ok(tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = int.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
