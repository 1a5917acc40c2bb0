//! Configuration for sessions and presence polling

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and retry behaviour of a card session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Attempts made for a card command that fails with a retryable code
    pub retry_attempts: u32,

    /// Pause between attempts of a card command
    pub retry_delay: Duration,

    /// Pause after a connect that failed because the card was busy
    pub connect_retry_delay: Duration,

    /// Upper bound on connect attempts, unbounded when `None`
    pub max_connect_attempts: Option<u32>,

    /// Pause after a successful connect, before the first command
    pub settle_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay: Duration::ZERO,
            connect_retry_delay: Duration::from_millis(10),
            max_connect_attempts: None,
            settle_delay: Duration::ZERO,
        }
    }
}

impl SessionConfig {
    /// Set the number of attempts for retryable card commands
    pub const fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Set the pause between command attempts
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the pause after a busy connect
    pub const fn with_connect_retry_delay(mut self, delay: Duration) -> Self {
        self.connect_retry_delay = delay;
        self
    }

    /// Bound the number of connect attempts
    pub const fn with_max_connect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_connect_attempts = attempts;
        self
    }

    /// Set the pause after a successful connect
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// Timing of the background presence poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Delay before the first scan
    pub initial_delay: Duration,

    /// Delay between scans
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            interval: Duration::from_millis(250),
        }
    }
}

impl PollerConfig {
    /// Set the delay before the first scan
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay between scans
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Combined configuration handed to every reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MifareConfig {
    /// Session behaviour
    pub session: SessionConfig,

    /// Poller timing
    pub poller: PollerConfig,
}

impl MifareConfig {
    /// Replace the session configuration
    pub const fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Replace the poller configuration
    pub const fn with_poller(mut self, poller: PollerConfig) -> Self {
        self.poller = poller;
        self
    }
}
