//! Responder runtime
//!
//! Manages subject subscriptions and dispatches each inbound request to a
//! handler keyed by the message's literal subject. Every message runs its
//! handler on its own spawned task, so one slow handler never delays other
//! messages on the same subject or any other. Handler results are
//! published to the message's reply-to inbox; handler failures become a
//! structured error reply instead of crossing the message boundary.

use crate::config::Config;
use crate::error::{HandlerError, ResponderError};
use crate::message::Message;
use crate::subject::Subject;
use crate::transport::{Subscription, Transport};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A request handler for one subject.
///
/// Handlers may suspend on arbitrary I/O; the runtime makes no assumption
/// that they are synchronous or fast.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Transform a request payload into a reply payload.
    async fn handle(&self, payload: Vec<u8>) -> Result<Vec<u8>, HandlerError>;
}

/// Adapt an async closure into a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>, HandlerError>> + Send,
{
    FnHandler(f)
}

/// [`Handler`] implementation wrapping a plain async function.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>, HandlerError>> + Send,
{
    async fn handle(&self, payload: Vec<u8>) -> Result<Vec<u8>, HandlerError> {
        (self.0)(payload).await
    }
}

/// Snapshot of responder counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponderStats {
    /// Inbound messages seen by dispatch.
    pub received: u64,
    /// Replies successfully handed to the transport.
    pub replied: u64,
    /// Handler executions that returned an error.
    pub handler_failures: u64,
    /// Messages dropped because no handler was registered for their subject.
    pub no_handler: u64,
    /// Handled messages that carried no reply-to subject.
    pub no_reply_to: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    replied: AtomicU64,
    handler_failures: AtomicU64,
    no_handler: AtomicU64,
    no_reply_to: AtomicU64,
}

/// Bookkeeping for one live consume loop.
struct Consumer {
    /// Distinguishes this loop from a successor on the same subject.
    id: Uuid,
    stop: CancellationToken,
}

struct ResponderInner {
    transport: Arc<dyn Transport>,
    config: Config,
    /// subject -> handler; last registration wins.
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
    /// Live consume loops by subject, each with its own stop signal.
    consuming: parking_lot::Mutex<HashMap<String, Consumer>>,
    started: AtomicBool,
    shutdown: CancellationToken,
    /// Consume loops, one per subscribed subject.
    loops: TaskTracker,
    /// In-flight handler executions.
    executions: TaskTracker,
    counters: Counters,
}

/// Subject-keyed request dispatcher over a pub/sub transport.
///
/// Counters and lifecycle state are owned by the instance and tied to
/// `start`/`stop`; nothing lives in process-wide globals.
#[derive(Clone)]
pub struct Responder {
    inner: Arc<ResponderInner>,
}

impl Responder {
    /// Create a responder with the default configuration.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, Config::default())
    }

    /// Create a responder with the given configuration.
    pub fn with_config(transport: Arc<dyn Transport>, config: Config) -> Self {
        Self {
            inner: Arc::new(ResponderInner {
                transport,
                config,
                handlers: RwLock::new(HashMap::new()),
                consuming: parking_lot::Mutex::new(HashMap::new()),
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                loops: TaskTracker::new(),
                executions: TaskTracker::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Register a handler for a subject.
    ///
    /// Registering the same subject twice replaces the previous handler;
    /// last write wins, logged so the replacement is never silent. When the
    /// responder is already running the subject is subscribed immediately,
    /// which is why this is async and fallible.
    pub async fn register(
        &self,
        subject: Subject,
        handler: impl Handler + 'static,
    ) -> Result<(), ResponderError> {
        let replaced = self
            .inner
            .handlers
            .write()
            .insert(subject.to_string(), Arc::new(handler))
            .is_some();

        if replaced {
            warn!(subject = %subject, "replacing existing handler (last registration wins)");
        } else {
            debug!(subject = %subject, "registered handler");
        }

        if self.inner.started.load(Ordering::SeqCst) {
            self.spawn_consumer(subject).await?;
        }

        Ok(())
    }

    /// Remove the handler for a subject and release its subscription.
    ///
    /// Returns `true` if a handler was registered. Safe to call whether or
    /// not the responder is running.
    pub fn unregister(&self, subject: &Subject) -> bool {
        let removed = self
            .inner
            .handlers
            .write()
            .remove(subject.as_str())
            .is_some();

        if let Some(consumer) = self.inner.consuming.lock().remove(subject.as_str()) {
            consumer.stop.cancel();
        }

        if removed {
            debug!(subject = %subject, "unregistered handler");
        }
        removed
    }

    /// Start consuming registered subjects.
    pub async fn start(&self) -> Result<(), ResponderError> {
        if self.inner.loops.is_closed() {
            return Err(ResponderError::Stopped);
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(ResponderError::AlreadyStarted);
        }

        let subjects: Vec<Subject> = self
            .inner
            .handlers
            .read()
            .keys()
            .map(|s| Subject::new_unchecked(s.clone()))
            .collect();

        for subject in subjects {
            if let Err(e) = self.spawn_consumer(subject).await {
                self.rollback_start();
                return Err(e);
            }
        }

        info!(
            subjects = self.inner.consuming.lock().len(),
            "responder started"
        );
        Ok(())
    }

    /// Undo a partial `start`: cancel every consume loop spawned so far and
    /// clear the started flag. The caller sees either a running responder or
    /// none.
    fn rollback_start(&self) {
        let consumers: Vec<Consumer> = {
            let mut consuming = self.inner.consuming.lock();
            consuming.drain().map(|(_, consumer)| consumer).collect()
        };
        for consumer in consumers {
            consumer.stop.cancel();
        }
        self.inner.started.store(false, Ordering::SeqCst);
    }

    /// Stop consuming, then wait for in-flight handlers up to the configured
    /// grace period. The responder cannot be restarted afterwards.
    pub async fn stop(&self) {
        let inner = &self.inner;

        inner.shutdown.cancel();
        inner.loops.close();
        inner.loops.wait().await;
        inner.consuming.lock().clear();

        inner.executions.close();
        if timeout(inner.config.shutdown_grace, inner.executions.wait())
            .await
            .is_err()
        {
            warn!(
                grace_ms = inner.config.shutdown_grace.as_millis() as u64,
                "grace period elapsed with handlers still in flight"
            );
        }

        let stats = self.stats();
        info!(
            received = stats.received,
            replied = stats.replied,
            "responder stopped"
        );
    }

    /// Snapshot of the dispatch counters.
    pub fn stats(&self) -> ResponderStats {
        let c = &self.inner.counters;
        ResponderStats {
            received: c.received.load(Ordering::Relaxed),
            replied: c.replied.load(Ordering::Relaxed),
            handler_failures: c.handler_failures.load(Ordering::Relaxed),
            no_handler: c.no_handler.load(Ordering::Relaxed),
            no_reply_to: c.no_reply_to.load(Ordering::Relaxed),
        }
    }

    /// Subscribe a subject and run its consume loop, unless one is already
    /// running.
    async fn spawn_consumer(&self, subject: Subject) -> Result<(), ResponderError> {
        let (id, stop) = {
            let mut consuming = self.inner.consuming.lock();
            if consuming.contains_key(subject.as_str()) {
                return Ok(());
            }
            let id = Uuid::new_v4();
            let stop = self.inner.shutdown.child_token();
            consuming.insert(
                subject.to_string(),
                Consumer {
                    id,
                    stop: stop.clone(),
                },
            );
            (id, stop)
        };

        let subscription = self
            .inner
            .transport
            .subscribe(&subject)
            .await
            .map_err(|source| {
                self.inner.consuming.lock().remove(subject.as_str());
                ResponderError::Subscribe {
                    subject: subject.to_string(),
                    source,
                }
            })?;

        let inner = self.inner.clone();
        self.inner
            .loops
            .spawn(consume_loop(inner, subject, subscription, stop, id));
        Ok(())
    }
}

async fn consume_loop(
    inner: Arc<ResponderInner>,
    subject: Subject,
    mut subscription: Subscription,
    stop: CancellationToken,
    id: Uuid,
) {
    debug!(subject = %subject, "consume loop running");

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            message = subscription.recv() => match message {
                Some(message) => dispatch(&inner, message),
                None => {
                    warn!(subject = %subject, "transport released subscription, consume loop ending");
                    // Drop this loop's entry so a later register subscribes
                    // anew. The id check leaves a successor's entry alone if
                    // one raced in through unregister + register.
                    let mut consuming = inner.consuming.lock();
                    if consuming.get(subject.as_str()).map(|c| c.id) == Some(id) {
                        consuming.remove(subject.as_str());
                    }
                    break;
                }
            }
        }
    }

    debug!(subject = %subject, "consume loop ended");
}

/// Dispatch one inbound message to its handler on a fresh task.
///
/// Lookup is by the message's literal subject, not by the subscription that
/// delivered it.
fn dispatch(inner: &Arc<ResponderInner>, message: Message) {
    inner.counters.received.fetch_add(1, Ordering::Relaxed);

    let handler = inner
        .handlers
        .read()
        .get(message.subject.as_str())
        .cloned();

    let Some(handler) = handler else {
        inner.counters.no_handler.fetch_add(1, Ordering::Relaxed);
        warn!(subject = %message.subject, "no handler registered, dropping request");
        return;
    };

    let inner = inner.clone();
    let executions = inner.executions.clone();
    executions.spawn(async move {
        let Message {
            subject,
            payload,
            reply_to,
        } = message;

        let outcome = handler.handle(payload).await;

        match (outcome, reply_to) {
            (Ok(reply), Some(reply_to)) => {
                let len = reply.len();
                match inner
                    .transport
                    .publish(Message::new(reply_to.clone(), reply))
                    .await
                {
                    Ok(()) => {
                        inner.counters.replied.fetch_add(1, Ordering::Relaxed);
                        debug!(subject = %subject, reply_to = %reply_to, bytes = len, "sent reply");
                    }
                    Err(e) => {
                        warn!(subject = %subject, reply_to = %reply_to, error = %e, "failed to publish reply");
                    }
                }
            }
            (Ok(_), None) => {
                inner.counters.no_reply_to.fetch_add(1, Ordering::Relaxed);
                debug!(subject = %subject, "handled message without reply-to, discarding result");
            }
            (Err(err), Some(reply_to)) => {
                inner
                    .counters
                    .handler_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(subject = %subject, error = %err, "handler failed, sending error reply");

                let error_payload = error_reply(&subject, &err);
                if let Err(e) = inner
                    .transport
                    .publish(Message::new(reply_to, error_payload))
                    .await
                {
                    warn!(subject = %subject, error = %e, "failed to publish error reply");
                }
            }
            (Err(err), None) => {
                inner
                    .counters
                    .handler_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(subject = %subject, error = %err, "handler failed, no reply-to to notify");
            }
        }
    });
}

/// Structured error payload sent in place of a reply when a handler fails.
fn error_reply(subject: &Subject, err: &HandlerError) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "status": "error",
        "subject": subject.as_str(),
        "message": err.message(),
    }))
    // A three-key object of strings cannot fail to serialize.
    .unwrap_or_default()
}
