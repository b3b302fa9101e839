//! Caller-side reconnection policy.
//!
//! The manager never retries by itself. When a channel ends with an
//! unexpected [`CloseReason`](crate::events::CloseReason), a caller may
//! run [`reconnect_loop`] to re-join the room with exponential backoff
//! until the channel is open again, the attempts run out, or the
//! [`CancellationToken`] is triggered.

use std::time::Duration;

use roomlink_core::room::RoomId;
use tokio_util::sync::CancellationToken;

use crate::events::ConnectionState;
use crate::manager::{ManagerError, RoomConnectionManager};

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Delay schedule for successive reconnect attempts.
///
/// Each call to [`Iterator::next`] starts one attempt and yields the delay
/// to wait before it. The iterator ends once `max_attempts` delays have
/// been handed out.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    delay: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            delay: config.initial_delay,
            config,
            attempts: 0,
        }
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start over from the initial delay.
    pub fn reset(&mut self) {
        self.delay = self.config.initial_delay;
        self.attempts = 0;
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self
            .config
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
        {
            return None;
        }
        let delay = self.delay;
        self.delay = next_delay(delay, &self.config);
        self.attempts += 1;
        Some(delay)
    }
}

/// How a [`reconnect_loop`] ended.
#[derive(Debug)]
pub enum ReconnectOutcome {
    /// The channel to the room is open again.
    Connected { attempts: u32 },
    /// The cancellation token fired first.
    Cancelled,
    /// `max_attempts` attempts failed.
    Exhausted { attempts: u32 },
    /// A command error that retrying cannot fix (e.g. no credential).
    Failed(ManagerError),
}

/// Re-join `room` with exponential backoff.
///
/// Each attempt waits for the current delay, issues `connect`, and then
/// waits for the manager to settle in `Open` (success) or `Idle`
/// (failure). A `ConnectionInProgress` rejection means another caller is
/// already connecting, so the attempt waits for that connect instead.
pub async fn reconnect_loop(
    manager: &RoomConnectionManager,
    room: &RoomId,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> ReconnectOutcome {
    let mut backoff = Backoff::new(config.clone());

    loop {
        let Some(delay) = backoff.next() else {
            let attempts = backoff.attempts();
            tracing::warn!(room = %room, attempts, "Giving up reconnecting");
            return ReconnectOutcome::Exhausted { attempts };
        };
        let attempt = backoff.attempts();

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(room = %room, "Reconnect cancelled");
                return ReconnectOutcome::Cancelled;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        // The token may fire while this task is being woken from the sleep.
        if cancel.is_cancelled() {
            tracing::info!(room = %room, "Reconnect cancelled");
            return ReconnectOutcome::Cancelled;
        }

        tracing::info!(
            room = %room,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to room",
        );

        match manager.connect(room.clone()) {
            Ok(()) | Err(ManagerError::ConnectionInProgress) => {}
            Err(e @ (ManagerError::MissingCredential | ManagerError::Endpoint(_))) => {
                tracing::error!(room = %room, error = %e, "Reconnect cannot proceed");
                return ReconnectOutcome::Failed(e);
            }
            Err(e) => {
                tracing::warn!(room = %room, error = %e, "Reconnect attempt {attempt} failed");
            }
        }

        let mut state_rx = manager.watch_state();
        let settled = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(room = %room, "Reconnect cancelled");
                return ReconnectOutcome::Cancelled;
            }
            result = state_rx.wait_for(|s| {
                matches!(s, ConnectionState::Open | ConnectionState::Idle)
            }) => {
                result.map(|s| (*s).clone()).ok()
            }
        };

        if settled == Some(ConnectionState::Open) && manager.current_room().as_ref() == Some(room) {
            tracing::info!(room = %room, attempt, "Reconnected to room");
            return ReconnectOutcome::Connected { attempts: attempt };
        }

        tracing::warn!(room = %room, attempt, "Reconnect attempt {attempt} failed");
    }
}
