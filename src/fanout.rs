//! Fan-out coordination
//!
//! Issues N independent request/reply calls concurrently and aggregates the
//! outcomes into one combined result. Results are collected positionally,
//! one entry per input subject in input order, regardless of which reply
//! arrives first, and the aggregate resolves only once every individual call
//! has resolved. Partial results are never returned early.

use crate::client::RequestClient;
use crate::error::CallError;
use crate::subject::Subject;

use futures::future::join_all;
use std::time::Duration;
use tracing::debug;

/// Outcome of one call within a fan-out.
#[derive(Debug)]
pub struct FanOutReply {
    /// The subject this entry corresponds to.
    pub subject: Subject,
    /// The call's result: reply payload, or how it failed.
    pub result: Result<Vec<u8>, CallError>,
}

/// Coordinates parallel request/reply calls over one client.
#[derive(Clone)]
pub struct FanOut {
    client: RequestClient,
}

impl FanOut {
    /// Create a coordinator over the given client.
    pub fn new(client: RequestClient) -> Self {
        Self { client }
    }

    /// Issue one call per subject, all with the same payload and per-call
    /// timeout, and collect every outcome in input order.
    pub async fn fan_out(
        &self,
        subjects: &[Subject],
        payload: &[u8],
        per_call_timeout: Duration,
    ) -> Vec<FanOutReply> {
        debug!(count = subjects.len(), "fanning out requests");

        let calls = subjects.iter().map(|subject| {
            let client = self.client.clone();
            let subject = subject.clone();
            let payload = payload.to_vec();
            async move {
                let result = client
                    .request_with_timeout(&subject, payload, per_call_timeout)
                    .await;
                FanOutReply { subject, result }
            }
        });

        join_all(calls).await
    }

    /// Fan out using the client's default timeout for every call.
    pub async fn fan_out_default(&self, subjects: &[Subject], payload: &[u8]) -> Vec<FanOutReply> {
        self.fan_out(subjects, payload, self.client.default_timeout())
            .await
    }
}
