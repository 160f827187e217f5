//! Error types for courier
//!
//! Every failure surfaces as a typed result; none terminates the process.
//! `Timeout` is recoverable (retrying is the caller's decision, never this
//! layer's). `Transport` failures are surfaced as-is without automatic retry.

use thiserror::Error;

/// Failures at the pub/sub connection layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport has been closed and accepts no further operations.
    #[error("transport is closed")]
    Closed,

    /// Publishing a message failed.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Establishing a subscription failed.
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// Outcome of a single request/reply call.
#[derive(Debug, Error)]
pub enum CallError {
    /// No reply arrived within the deadline.
    #[error("request timed out")]
    Timeout,

    /// The underlying transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The caller abandoned the call.
    #[error("request cancelled")]
    Cancelled,
}

impl CallError {
    /// True if the call timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout)
    }
}

/// A failure raised inside a responder-side handler.
///
/// Captured by the runtime and turned into a structured error reply; never
/// propagated across the message boundary as a crash.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Responder lifecycle failures.
#[derive(Debug, Error)]
pub enum ResponderError {
    /// `start()` was called while the responder was already running.
    #[error("responder already started")]
    AlreadyStarted,

    /// The responder has been stopped and cannot be restarted.
    #[error("responder is stopped")]
    Stopped,

    /// Subscribing to a registered subject failed.
    #[error("failed to subscribe to {subject}: {source}")]
    Subscribe {
        subject: String,
        source: TransportError,
    },
}
