//! Wall-clock time source for the scheduler.
//!
//! Timer tasks never sleep for the whole distance to an alarm in one go: the
//! wall clock can be adjusted or the machine suspended, so `sleep_until`
//! sleeps in slices and re-reads `now()` between them.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};

/// Longest single sleep before the wall clock is consulted again.
pub const MAX_SLEEP_SLICE: Duration = Duration::from_secs(60);

/// Source of "now" plus a way to wait for a local instant.
#[async_trait]
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Local>;

    /// Returns once `now() >= deadline`. Returns immediately for past deadlines.
    ///
    /// Cancel-safe: dropping the future simply stops waiting.
    async fn sleep_until(&self, deadline: DateTime<Local>) {
        loop {
            let remaining = match (deadline - self.now()).to_std() {
                Ok(d) if !d.is_zero() => d,
                // Negative or zero distance: the deadline has passed.
                _ => return,
            };
            tokio::time::sleep(remaining.min(MAX_SLEEP_SLICE)).await;
        }
    }
}

/// The real local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that follows tokio's timer instead of the system clock.
///
/// `now()` is the wall time at construction plus the tokio time elapsed since,
/// so under `tokio::time::pause()` alarms fire as the test advances time.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: DateTime<Local>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(Local::now())
    }

    /// Starts the clock at a chosen wall time.
    pub fn starting_at(origin: DateTime<Local>) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Local> {
        let elapsed = self.started.elapsed();
        chrono::TimeDelta::from_std(elapsed)
            .ok()
            .and_then(|delta| self.origin.checked_add_signed(delta))
            .unwrap_or(self.origin)
    }
}
