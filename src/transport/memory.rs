//! In-process transport
//!
//! An exact-match pub/sub broker living entirely inside the process, used by
//! tests and demos. Each subscription gets a bounded delivery buffer; a
//! message that finds the buffer full or the receiver gone is dropped
//! (at-most-once delivery, same as a broker under backpressure).

use crate::config::Config;
use crate::error::TransportError;
use crate::message::Message;
use crate::subject::Subject;
use crate::transport::{Subscription, Transport};

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Snapshot of transport counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryTransportStats {
    /// Messages accepted by `publish`.
    pub published: u64,
    /// Message deliveries into subscription buffers.
    pub delivered: u64,
    /// Deliveries dropped because a buffer was full or its receiver gone.
    pub dropped: u64,
    /// Payload bytes accepted by `publish`.
    pub bytes_published: u64,
    /// Payload bytes delivered into subscription buffers.
    pub bytes_delivered: u64,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    bytes_published: AtomicU64,
    bytes_delivered: AtomicU64,
}

struct MemoryInner {
    /// subject -> per-subscriber delivery senders
    topics: DashMap<String, HashMap<Uuid, mpsc::Sender<Message>>>,
    buffer: usize,
    closed: AtomicBool,
    counters: Counters,
}

/// In-process pub/sub transport.
///
/// Cheaply cloneable; all clones share one broker state.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

impl MemoryTransport {
    /// Create a transport with the default subscription buffer capacity.
    pub fn new() -> Self {
        Self::with_buffer(Config::default().subscription_buffer)
    }

    /// Create a transport with the given per-subscription buffer capacity.
    pub fn with_buffer(capacity: usize) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                topics: DashMap::new(),
                buffer: capacity.max(1),
                closed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Close the transport.
    ///
    /// Further publishes and subscribes fail with
    /// [`TransportError::Closed`]; existing subscriptions see end-of-stream.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.topics.clear();
        debug!("memory transport closed");
    }

    /// Number of currently active subscriptions across all subjects.
    pub fn subscription_count(&self) -> usize {
        self.inner
            .topics
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }

    /// Snapshot of the delivery counters.
    pub fn stats(&self) -> MemoryTransportStats {
        let c = &self.inner.counters;
        MemoryTransportStats {
            published: c.published.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            bytes_published: c.bytes_published.load(Ordering::Relaxed),
            bytes_delivered: c.bytes_delivered.load(Ordering::Relaxed),
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, message: Message) -> Result<(), TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let counters = &self.inner.counters;
        counters.published.fetch_add(1, Ordering::Relaxed);
        counters
            .bytes_published
            .fetch_add(message.payload.len() as u64, Ordering::Relaxed);

        let Some(subscribers) = self.inner.topics.get(message.subject.as_str()) else {
            debug!(subject = %message.subject, "no subscribers for subject");
            return Ok(());
        };

        for (id, sender) in subscribers.iter() {
            match sender.try_send(message.clone()) {
                Ok(()) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                    counters
                        .bytes_delivered
                        .fetch_add(message.payload.len() as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        subject = %message.subject,
                        subscriber = %id,
                        error = %e,
                        "dropping delivery (buffer full or subscriber gone)"
                    );
                }
            }
        }

        Ok(())
    }

    async fn subscribe(&self, subject: &Subject) -> Result<Subscription, TransportError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let id = Uuid::new_v4();

        self.inner
            .topics
            .entry(subject.to_string())
            .or_default()
            .insert(id, tx);

        debug!(subject = %subject, subscriber = %id, "subscribed");

        let inner = self.inner.clone();
        let key = subject.to_string();
        let cleanup = move || {
            if let Some(mut subscribers) = inner.topics.get_mut(&key) {
                subscribers.remove(&id);
                let now_empty = subscribers.is_empty();
                drop(subscribers);
                if now_empty {
                    inner.topics.remove_if(&key, |_, subs| subs.is_empty());
                }
            }
        };

        Ok(Subscription::new(subject.clone(), rx, cleanup))
    }
}
