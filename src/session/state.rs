use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum automatic reconnect attempts before giving up
pub const MAX_RETRIES: u32 = 5;

/// First backoff delay; doubles per attempt
pub const BACKOFF_BASE: Duration = Duration::from_millis(1000);

/// Backoff ceiling
pub const BACKOFF_CAP: Duration = Duration::from_millis(10_000);

/// Lifecycle state of the session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Terminal failure; only an explicit user connect() recovers
    Error,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal lifecycle transition.
    ///
    /// DISCONNECTED -> CONNECTING -> CONNECTED -> (RECONNECTING <-> CONNECTED)
    /// -> DISCONNECTED, with ERROR reachable from the three live states.
    pub fn allows(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        if self == next {
            return true;
        }

        match self {
            Disconnected => matches!(next, Connecting),
            Connecting => matches!(next, Connected | Reconnecting | Disconnected | Error),
            Connected => matches!(next, Reconnecting | Disconnected | Error),
            Reconnecting => matches!(next, Connected | Disconnected | Error),
            Error => matches!(next, Connecting),
        }
    }
}

/// Retry bookkeeping while the session is unstable.
///
/// Lives between a connection failure and either a successful open (reset)
/// or retry exhaustion (terminal error).
#[derive(Debug, Default)]
pub struct ReconnectState {
    /// Failed attempts so far; the delay for the next retry is derived
    /// from this before it is incremented
    pub attempt: u32,

    /// Why the last attempt failed, for logging and the transcript
    pub last_failure: Option<String>,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before the next retry: min(1000ms * 2^attempt, 10s)
    pub fn next_delay(&self) -> Duration {
        let exp = BACKOFF_BASE.saturating_mul(1u32 << self.attempt.min(31));
        exp.min(BACKOFF_CAP)
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= MAX_RETRIES
    }

    /// Called on every successful open
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_failure = None;
    }
}
