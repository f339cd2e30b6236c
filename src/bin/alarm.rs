//! alarm - command-line client for the smart-alarm daemon
//!
//! # Usage
//!
//! ```text
//! alarm add Meeting 2030-01-01 09:00          # one-shot alarm
//! alarm add Gym 2030-01-02 18:30 --repeat     # every week
//! alarm add Standup --at 2030-01-03T09:15     # datetime-local form
//! alarm cancel Meeting
//! alarm clear                                 # empty the notifications
//! alarm list
//! alarm watch                                 # follow events as they happen
//! ```
//!
//! The daemon is started automatically when it is not running.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use alarm_cli::daemon::{self, APP_DIR};
use alarm_cli::render::{render_event, render_state};
use alarm_cli::{ClientConfig, DaemonClient};
use alarm_protocol::RawAlarmRequest;

// ============================================================================
// CLI Arguments
// ============================================================================

/// alarm - set, cancel and list spoken alarms
#[derive(Parser, Debug)]
#[command(name = "alarm", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Daemon socket (default: $ALARM_SOCKET, then socket_path in the daemon config file)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Do not start the daemon if it is not running
    #[arg(long, global = true)]
    no_start: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schedule an alarm
    Add(AddArgs),
    /// Cancel a pending alarm by description
    Cancel {
        /// Description used when the alarm was added
        description: Vec<String>,
    },
    /// Clear the notifications list
    Clear,
    /// Show pending alarms and notifications
    List,
    /// Follow alarm events until interrupted
    Watch,
}

#[derive(ClapArgs, Debug)]
struct AddArgs {
    /// What the alarm is for
    description: String,

    /// Day as YYYY-MM-DD
    #[arg(required_unless_present = "at", conflicts_with = "at")]
    day: Option<String>,

    /// Time as HH:MM (24-hour)
    #[arg(required_unless_present = "at", conflicts_with = "at")]
    time: Option<String>,

    /// Day and time as YYYY-MM-DDTHH:MM
    #[arg(long)]
    at: Option<String>,

    /// Repeat every week at the same time
    #[arg(short, long)]
    repeat: bool,
}

impl AddArgs {
    fn into_request(self) -> RawAlarmRequest {
        match (self.day, self.time, self.at) {
            (_, _, Some(at)) => RawAlarmRequest::from_datetime_local(self.description, at, self.repeat),
            (day, time, None) => RawAlarmRequest {
                description: self.description,
                day,
                time,
                alarm: None,
                repeat: self.repeat,
            },
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

fn get_log_dir() -> Option<PathBuf> {
    dirs::state_dir().map(|dir| dir.join(APP_DIR))
}

fn create_log_file() -> Option<fs::File> {
    let log_dir = get_log_dir()?;

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory {log_dir:?}: {e}");
        return None;
    }

    let log_path = log_dir.join("alarm.log");

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: Failed to open log file {log_path:?}: {e}");
            None
        }
    }
}

fn init_logging() {
    if let Some(file) = create_log_file() {
        let filter = EnvFilter::from_default_env().add_directive(
            "alarm_cli=info"
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::Directive::from(tracing::Level::INFO)),
        );

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("off"))
            .init();
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let mut config = ClientConfig::load(None);
    if let Some(socket) = args.socket {
        config.socket_path = socket;
    }

    if !args.no_start {
        daemon::ensure_daemon_running(&config.socket_path)
            .await
            .context("Failed to ensure daemon is running")?;
    }

    let mut client = DaemonClient::connect(config)
        .await
        .context("Failed to connect to alarmd")?;
    info!(client_id = %client.client_id(), command = ?args.command, "Connected");

    match args.command {
        Command::Add(add) => {
            let alarm = client.create_alarm(add.into_request()).await?;
            println!("{}", alarm.display_text);
        }
        Command::Cancel { description } => {
            let description = description.join(" ");
            if description.trim().is_empty() {
                bail!("A description is required");
            }
            let alarm = client.cancel_alarm(&description).await?;
            println!("Cancelled: {}", alarm.display_text);
        }
        Command::Clear => {
            let cleared = client.clear_notices().await?;
            println!("Cleared {cleared} notification(s).");
        }
        Command::List => {
            let state = client.list().await?;
            print!("{}", render_state(&state));
        }
        Command::Watch => {
            let mut state = client.subscribe().await?;
            print!("{}", render_state(&state));

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = client.next_event() => match event? {
                        Some(message) => {
                            state.apply(&message);
                            if let Some(line) = render_event(&message) {
                                println!("{line}");
                            }
                        }
                        None => bail!("Daemon closed the connection"),
                    },
                }
            }
            return Ok(());
        }
    }

    client.disconnect().await?;
    Ok(())
}
