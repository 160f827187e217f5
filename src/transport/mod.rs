//! Transport boundary
//!
//! The core consumes an asynchronous publish/subscribe connection through the
//! [`Transport`] trait: `publish(subject, bytes)` plus `subscribe(subject)`
//! yielding a stream of messages. Delivery is at-most-once per subscription
//! with no ordering guarantee across subjects, and the transport has no
//! built-in request/reply primitive; that is what this crate adds on top.

mod memory;

pub use memory::{MemoryTransport, MemoryTransportStats};

use crate::error::TransportError;
use crate::message::Message;
use crate::subject::Subject;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

/// An asynchronous publish/subscribe connection.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publish a message to its subject.
    ///
    /// Succeeds even when nobody is subscribed; pub/sub has no notion of an
    /// unreachable destination.
    async fn publish(&self, message: Message) -> Result<(), TransportError>;

    /// Subscribe to a subject, receiving every message published to it for
    /// the lifetime of the returned handle.
    async fn subscribe(&self, subject: &Subject) -> Result<Subscription, TransportError>;
}

/// An active subscription.
///
/// Yields messages via [`recv`](Subscription::recv) and releases the
/// underlying registration exactly once: either explicitly through
/// [`unsubscribe`](Subscription::unsubscribe) or implicitly on drop. The drop
/// path also runs when the owning task panics or is aborted, which is what
/// keeps outstanding registrations bounded by in-flight work.
pub struct Subscription {
    subject: Subject,
    receiver: mpsc::Receiver<Message>,
    _guard: UnsubscribeGuard,
}

impl Subscription {
    /// Build a subscription from a delivery channel and a cleanup closure.
    ///
    /// The cleanup closure runs exactly once, when the subscription is
    /// dropped.
    pub fn new(
        subject: Subject,
        receiver: mpsc::Receiver<Message>,
        cleanup: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            subject,
            receiver,
            _guard: UnsubscribeGuard(Some(Box::new(cleanup))),
        }
    }

    /// The subject this subscription is registered on.
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Receive the next message, or `None` once the transport has released
    /// this subscription's delivery channel.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Release the subscription.
    ///
    /// Dropping the handle has the same effect; this form just makes the
    /// intent explicit at call sites.
    pub fn unsubscribe(self) {
        trace!(subject = %self.subject, "unsubscribing");
    }
}

struct UnsubscribeGuard(Option<Box<dyn FnOnce() + Send>>);

impl Drop for UnsubscribeGuard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.0.take() {
            cleanup();
        }
    }
}
