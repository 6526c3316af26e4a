//! Tunable parameters for rooms and store retries.
//!
//! Plain structs with defaults, threaded explicitly into engine calls. There
//! is no global configuration.

use std::time::Duration;

use tracing::trace;

use crate::error::RoomError;

/// Room behavior parameters.
///
/// Defaults match the product rules: 8 seats, 24-hour rooms, 30-second
/// presence freshness against 10-second heartbeats, 2-second typing signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomConfig {
    /// Maximum number of simultaneously *active* members (presence-based).
    pub capacity: usize,

    /// Room lifetime from creation to soft expiry.
    pub room_ttl: Duration,

    /// Window after the last heartbeat during which a member counts as
    /// active. Must comfortably exceed `heartbeat_interval`.
    pub presence_window: Duration,

    /// How often an attached client refreshes its member record.
    pub heartbeat_interval: Duration,

    /// Age after which a typing record is treated as absent by readers.
    pub typing_ttl: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            room_ttl: Duration::from_secs(24 * 60 * 60),
            presence_window: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            typing_ttl: Duration::from_secs(2),
        }
    }
}

impl RoomConfig {
    /// `presence_window` in milliseconds, the unit of store timestamps.
    pub fn presence_window_ms(&self) -> u64 {
        self.presence_window.as_millis() as u64
    }

    /// `room_ttl` in milliseconds.
    pub fn room_ttl_ms(&self) -> u64 {
        self.room_ttl.as_millis() as u64
    }

    /// `typing_ttl` in milliseconds.
    pub fn typing_ttl_ms(&self) -> u64 {
        self.typing_ttl.as_millis() as u64
    }
}

/// Bounded retry schedule for transient store conflicts.
///
/// Delays grow exponentially from `base_delay` and are capped at `max_delay`.
/// Attempt numbering starts at 0 (the first retry waits `base_delay`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before a conflict becomes terminal.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(16);
        let scaled = self.base_delay.saturating_mul(1u32 << shift);
        scaled.min(self.max_delay)
    }

    /// Runs `op` to completion within this policy's attempt budget.
    ///
    /// Transient failures re-run the operation against fresh state;
    /// everything else returns immediately. The operation always runs
    /// at least once, and a budget exhausted by transient failures
    /// becomes [`RoomError::Contended`]. Retries are immediate; pacing
    /// with [`delay`](Self::delay) is up to async callers that can
    /// sleep.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T, RoomError>) -> Result<T, RoomError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op() {
                Err(err) if err.is_transient() => {
                    if attempts >= self.max_attempts {
                        return Err(RoomError::Contended { attempts });
                    }
                    trace!(attempts, "transient store conflict, retrying");
                }
                other => return other,
            }
        }
    }
}
