//! Configuration for courier components
//!
//! One builder-style config shared by the request client, the responder
//! runtime, and the in-memory transport. The broker-facing knobs
//! (`max_reconnect`, `reconnect_wait`, `ping_interval`) are carried for
//! transports that maintain a real connection; the in-memory transport
//! ignores them.

use std::time::Duration;

/// Default private prefix for per-call inbox subjects.
pub const DEFAULT_INBOX_PREFIX: &str = "_INBOX";

/// Configuration for courier components.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default deadline for a request/reply call.
    pub default_timeout: Duration,

    /// Private prefix under which per-call inbox subjects are generated.
    pub inbox_prefix: String,

    /// How long `Responder::stop` waits for in-flight handlers.
    pub shutdown_grace: Duration,

    /// Per-subscription delivery buffer capacity (in-memory transport).
    pub subscription_buffer: usize,

    /// Reconnection attempt budget for broker-backed transports.
    pub max_reconnect: u32,

    /// Backoff between reconnection attempts for broker-backed transports.
    pub reconnect_wait: Duration,

    /// Liveness probe period for broker-backed transports.
    pub ping_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(3),
            inbox_prefix: DEFAULT_INBOX_PREFIX.to_string(),
            shutdown_grace: Duration::from_secs(5),
            subscription_buffer: 100,
            max_reconnect: 10,
            reconnect_wait: Duration::from_secs(2),
            ping_interval: Duration::from_secs(20),
        }
    }
}

impl Config {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default request deadline.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the inbox subject prefix.
    ///
    /// Must itself be a valid subject; an invalid prefix is rejected at
    /// client construction and replaced with [`DEFAULT_INBOX_PREFIX`].
    pub fn with_inbox_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.inbox_prefix = prefix.into();
        self
    }

    /// Set the responder shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set the per-subscription delivery buffer capacity.
    pub fn with_subscription_buffer(mut self, capacity: usize) -> Self {
        self.subscription_buffer = capacity;
        self
    }

    /// Set the reconnection attempt budget.
    pub fn with_max_reconnect(mut self, attempts: u32) -> Self {
        self.max_reconnect = attempts;
        self
    }

    /// Set the reconnection backoff.
    pub fn with_reconnect_wait(mut self, wait: Duration) -> Self {
        self.reconnect_wait = wait;
        self
    }

    /// Set the liveness probe period.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }
}
