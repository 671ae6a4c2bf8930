//! The `Transport` trait both queue backends implement.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::message::Message;

/// Health snapshot of a transport's connection to its backing queue provider.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransportHealth {
    pub connected: bool,
    pub approximate_message_count: Option<u64>,
    pub provider: String,
}

/// Uniform queue access for the router and gateway, regardless of whether
/// the underlying provider pushes (a broker, acked per-delivery) or must be
/// polled (SQS, acked by deleting a receipt handle before its visibility
/// timeout expires).
///
/// Implementations are expected to be cheaply cloneable handles around a
/// shared connection, not to open a fresh connection per call.
///
/// Every blocking call carries a `ctx` [`CancellationToken`], the stand-in
/// for `spec.md` §5's "per-call context carrying a deadline and a
/// cancellation signal": a cancelled token aborts the call in flight and it
/// fails with [`TransportError::ContextCancelled`] instead of completing or
/// blocking further (`spec.md` §4.1, §7).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `body` to `queue`, carrying `headers` as message metadata.
    async fn send(
        &self,
        ctx: &CancellationToken,
        queue: &str,
        body: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> Result<(), TransportError>;

    /// Long-poll `queue` for up to `max_messages`. Returns an empty vec
    /// rather than blocking forever if nothing arrives within the
    /// provider's poll window.
    async fn receive(&self, ctx: &CancellationToken, queue: &str, max_messages: u32) -> Result<Vec<Message>, TransportError>;

    /// Acknowledge successful processing — removes the message for good.
    async fn ack(&self, ctx: &CancellationToken, message: &Message) -> Result<(), TransportError>;

    /// Return a message to its queue for redelivery.
    async fn nack(&self, ctx: &CancellationToken, message: &Message) -> Result<(), TransportError>;

    /// Connectivity and depth snapshot, used by the gateway's `/health`.
    async fn health_check(&self, queue: &str) -> Result<TransportHealth, TransportError>;
}
