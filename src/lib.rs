//! Courier - correlation-based request/reply over async pub/sub
//!
//! A minimal request/reply messaging layer built on a raw publish/subscribe
//! transport: per-call private inbox subjects correlate each reply to its
//! originating request, a responder runtime dispatches subject-keyed handlers
//! concurrently, and a fan-out coordinator aggregates parallel calls with
//! stable ordering. The transport itself is a trait; an in-memory
//! implementation ships for tests and demos.
//!
//! # Example
//!
//! ```no_run
//! use courier::{handler_fn, MemoryTransport, RequestClient, Responder, Subject};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(MemoryTransport::new());
//!
//!     // Responder side: register a handler and start consuming.
//!     let responder = Responder::new(transport.clone());
//!     responder
//!         .register(
//!             Subject::parse("order.process")?,
//!             handler_fn(|payload: Vec<u8>| async move {
//!                 let mut reply = b"ACK:".to_vec();
//!                 reply.extend_from_slice(&payload);
//!                 Ok(reply)
//!             }),
//!         )
//!         .await?;
//!     responder.start().await?;
//!
//!     // Requester side: one call, bounded by a deadline.
//!     let client = RequestClient::new(transport);
//!     let reply = client
//!         .request_with_timeout(
//!             &Subject::parse("order.process")?,
//!             b"Order-1".to_vec(),
//!             Duration::from_millis(500),
//!         )
//!         .await?;
//!     assert_eq!(reply, b"ACK:Order-1");
//!
//!     responder.stop().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod fanout;
pub mod message;
pub mod responder;
pub mod subject;
pub mod transport;

pub use client::{CallOptions, CancelToken, RequestClient};
pub use config::Config;
pub use error::{CallError, HandlerError, ResponderError, TransportError};
pub use fanout::{FanOut, FanOutReply};
pub use message::Message;
pub use responder::{handler_fn, Handler, Responder, ResponderStats};
pub use subject::{Subject, SubjectError};
pub use transport::{MemoryTransport, MemoryTransportStats, Subscription, Transport};
