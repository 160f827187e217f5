//! Request/reply client
//!
//! Builds the request/reply idiom on top of raw pub/sub. Each call generates
//! a globally-unique inbox subject, subscribes to it *before* publishing the
//! request (a reply from a fast responder must not race the subscription into
//! the void), publishes with `reply_to` set to the inbox, then waits for the
//! first of: the correlated reply, the deadline, or caller cancellation.
//!
//! Outstanding calls live in a sharded pending table keyed by inbox token.
//! Whichever path removes a call's entry owns the outcome; the losing paths
//! become no-ops. The inbox subscription is released exactly once on every
//! path: before the call returns whenever it runs to completion (including
//! publish failure), and via drop guards when the call future itself is
//! dropped.

use crate::config::Config;
use crate::error::CallError;
use crate::message::Message;
use crate::subject::Subject;
use crate::transport::Transport;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// One outstanding request, owned by the pending table between publish and
/// resolution. The deadline itself is owned by the awaiting call future.
struct PendingCall {
    reply: oneshot::Sender<Vec<u8>>,
}

/// Per-call options for [`RequestClient::request_with`].
#[derive(Default)]
pub struct CallOptions {
    /// Deadline override; the configured default applies when `None`.
    pub timeout: Option<Duration>,
    /// Optional caller-side cancellation signal.
    pub cancel: Option<CancelToken>,
}

impl CallOptions {
    /// Options using the client's default timeout and no cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the deadline for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token to this call.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Idempotent, race-safe cancellation signal for a call.
///
/// `cancel()` may be invoked any number of times from any task; only the
/// first transition matters. Cancelling after the call has already resolved
/// is a no-op and does not disturb the produced result.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            cancelled: Arc::new(tx),
        }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Resolve once cancellation is signalled.
    pub async fn cancelled(&self) {
        let mut rx = self.cancelled.subscribe();
        // The sender lives on self, so this cannot error while we wait; if it
        // ever does, the token can no longer fire and the signal never comes.
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    config: Config,
    /// inbox token -> pending call; sharded locking via DashMap keeps
    /// insert (caller) and resolve (delivery path) contention low.
    pending: DashMap<String, PendingCall>,
}

/// Request/reply client over a pub/sub transport.
///
/// Cheaply cloneable; clones share the pending table and transport handle.
#[derive(Clone)]
pub struct RequestClient {
    inner: Arc<ClientInner>,
}

impl RequestClient {
    /// Create a client with the default configuration.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, Config::default())
    }

    /// Create a client with the given configuration.
    pub fn with_config(transport: Arc<dyn Transport>, mut config: Config) -> Self {
        if Subject::parse(&config.inbox_prefix).is_err() {
            warn!(
                prefix = %config.inbox_prefix,
                "invalid inbox prefix, falling back to default"
            );
            config.inbox_prefix = crate::config::DEFAULT_INBOX_PREFIX.to_string();
        }

        Self {
            inner: Arc::new(ClientInner {
                transport,
                config,
                pending: DashMap::new(),
            }),
        }
    }

    /// The configured default request deadline.
    pub fn default_timeout(&self) -> Duration {
        self.inner.config.default_timeout
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Send a request and await the reply, using the default timeout.
    pub async fn request(
        &self,
        subject: &Subject,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, CallError> {
        self.request_with(subject, payload, CallOptions::new()).await
    }

    /// Send a request with a custom deadline.
    pub async fn request_with_timeout(
        &self,
        subject: &Subject,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, CallError> {
        self.request_with(subject, payload, CallOptions::new().with_timeout(timeout))
            .await
    }

    /// Send a request with explicit per-call options.
    pub async fn request_with(
        &self,
        subject: &Subject,
        payload: Vec<u8>,
        options: CallOptions,
    ) -> Result<Vec<u8>, CallError> {
        let inner = &self.inner;
        let timeout = options.timeout.unwrap_or(inner.config.default_timeout);
        let deadline = Instant::now() + timeout;

        let inbox = self.new_inbox();
        let token = inbox.as_str().to_string();

        debug!(subject = %subject, inbox = %inbox, timeout_ms = timeout.as_millis() as u64, "sending request");

        // The inbox must be live before the request leaves, otherwise a fast
        // responder's reply can arrive before anyone is listening.
        let subscription = inner.transport.subscribe(&inbox).await?;

        let (reply_tx, mut reply_rx) = oneshot::channel();
        inner
            .pending
            .insert(token.clone(), PendingCall { reply: reply_tx });
        let _pending_guard = PendingGuard {
            inner: inner.clone(),
            token: token.clone(),
        };

        // Delivery path: owns the inbox subscription, resolves the pending
        // entry when the correlated reply arrives. Shut down as soon as the
        // call settles.
        let mut delivery = DeliveryGuard(tokio::spawn({
            let inner = inner.clone();
            let token = token.clone();
            let mut subscription = subscription;
            async move {
                if let Some(message) = subscription.recv().await {
                    if let Some((_, call)) = inner.pending.remove(&token) {
                        let _ = call.reply.send(message.payload);
                    }
                }
            }
        }));

        let request = Message::with_reply_to(subject.clone(), payload, inbox);
        let result = match inner.transport.publish(request).await {
            Err(e) => Err(CallError::Transport(e)),
            Ok(()) => tokio::select! {
                reply = &mut reply_rx => match reply {
                    Ok(payload) => {
                        debug!(subject = %subject, bytes = payload.len(), "received reply");
                        Ok(payload)
                    }
                    // Pending entry discarded without a reply; deadline
                    // semantics apply.
                    Err(_) => Err(CallError::Timeout),
                },
                _ = tokio::time::sleep_until(deadline) => {
                    match inner.pending.remove(&token) {
                        Some(_) => {
                            debug!(subject = %subject, "request timed out");
                            Err(CallError::Timeout)
                        }
                        // The reply won the race just before the deadline
                        // fired; first transition wins.
                        None => reply_rx.await.map_err(|_| CallError::Timeout),
                    }
                }
                _ = cancelled_signal(options.cancel.as_ref()) => {
                    match inner.pending.remove(&token) {
                        Some(_) => {
                            debug!(subject = %subject, "request cancelled");
                            Err(CallError::Cancelled)
                        }
                        // Already resolved; cancellation is a no-op.
                        None => reply_rx.await.map_err(|_| CallError::Cancelled),
                    }
                }
            },
        };

        // Settle the inbox before returning: abort the delivery task and
        // wait for it to drop the subscription. The inbox registration must
        // not outlive the call.
        delivery.0.abort();
        let _ = (&mut delivery.0).await;

        result
    }

    fn new_inbox(&self) -> Subject {
        // 128-bit random token under the private prefix; collision odds
        // between concurrent outstanding calls are negligible.
        Subject::new_unchecked(format!(
            "{}.{}",
            self.inner.config.inbox_prefix,
            Uuid::new_v4().simple()
        ))
    }
}

async fn cancelled_signal(token: Option<&CancelToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Removes the pending entry when the call settles on any path, including
/// publish failure and caller-side drop. No-op if the entry is already gone.
struct PendingGuard {
    inner: Arc<ClientInner>,
    token: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.inner.pending.remove(&self.token);
    }
}

/// Aborts the delivery task if the call future is dropped before it settles;
/// dropping the task drops the inbox subscription, whose own guard performs
/// the actual unsubscribe. A call that runs to completion shuts the task
/// down explicitly and waits for it instead.
struct DeliveryGuard(JoinHandle<()>);

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;

    fn client_with_transport() -> (RequestClient, MemoryTransport) {
        let transport = MemoryTransport::new();
        let client = RequestClient::new(Arc::new(transport.clone()));
        (client, transport)
    }

    #[test]
    fn test_cancel_token_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_token_signals_waiters() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancel_token_already_cancelled_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("should resolve without waiting");
    }

    #[tokio::test]
    async fn test_request_times_out_with_no_responder() {
        let (client, transport) = client_with_transport();
        let subject = Subject::parse("nobody.listens").unwrap();

        let start = Instant::now();
        let result = client
            .request_with_timeout(&subject, b"ping".to_vec(), Duration::from_millis(100))
            .await;
        let elapsed = start.elapsed();

        assert!(matches!(result, Err(CallError::Timeout)));
        assert!(elapsed >= Duration::from_millis(100));
        assert_eq!(client.pending_calls(), 0);

        // The inbox is released before the call returns, not eventually.
        assert_eq!(transport.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_request_cancelled_before_reply() {
        let (client, _transport) = client_with_transport();
        let subject = Subject::parse("slow.responder").unwrap();
        let cancel = CancelToken::new();

        let call = {
            let client = client.clone();
            let subject = subject.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                client
                    .request_with(
                        &subject,
                        b"ping".to_vec(),
                        CallOptions::new()
                            .with_timeout(Duration::from_secs(10))
                            .with_cancel(cancel),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = call.await.unwrap();
        assert!(matches!(result, Err(CallError::Cancelled)));
        assert_eq!(client.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_and_cleans_up() {
        let (client, transport) = client_with_transport();
        let subject = Subject::parse("gone.bus").unwrap();

        // Closing between construction and call makes subscribe fail first.
        transport.close();

        let result = client.request(&subject, b"ping".to_vec()).await;
        assert!(matches!(result, Err(CallError::Transport(_))));
        assert_eq!(client.pending_calls(), 0);
        assert_eq!(transport.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_inbox_subjects_are_unique_and_prefixed() {
        let (client, _transport) = client_with_transport();

        let a = client.new_inbox();
        let b = client.new_inbox();

        assert_ne!(a, b);
        assert!(a.as_str().starts_with("_INBOX."));
        assert!(b.as_str().starts_with("_INBOX."));
    }

    #[tokio::test]
    async fn test_invalid_inbox_prefix_falls_back_to_default() {
        let transport = MemoryTransport::new();
        let config = Config::default().with_inbox_prefix("has space");
        let client = RequestClient::with_config(Arc::new(transport), config);

        assert!(client.new_inbox().as_str().starts_with("_INBOX."));
    }
}
