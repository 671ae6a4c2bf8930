//! Queue transport abstraction: one `Transport` trait, two interchangeable
//! backends (RabbitMQ for broker-style push delivery, SQS for long-poll).

pub mod error;
pub mod message;
pub mod rabbitmq;
pub mod receipt;
pub mod sqs;
pub mod transport;

pub use error::TransportError;
pub use message::Message;
pub use rabbitmq::RabbitMqTransport;
pub use receipt::{join_receipt_handle, split_receipt_handle};
pub use sqs::SqsTransport;
pub use transport::{Transport, TransportHealth};

use std::future::Future;
use std::sync::Arc;

use asya_core::config::TransportConfig;
use tokio_util::sync::CancellationToken;

/// Races `fut` against `ctx` being cancelled, so a backend implementation
/// doesn't have to hand-roll the same `tokio::select!` at every call site.
/// `spec.md` §5: "honor context cancellation and return promptly with a
/// `context_cancelled` failure."
pub(crate) async fn cancellable<T>(ctx: &CancellationToken, fut: impl Future<Output = Result<T, TransportError>>) -> Result<T, TransportError> {
    tokio::select! {
        _ = ctx.cancelled() => Err(TransportError::ContextCancelled),
        result = fut => result,
    }
}

/// Builds the configured backend behind the `Transport` trait object.
pub async fn connect(config: &TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
    match config.backend.as_str() {
        "rabbitmq" => {
            let url = config
                .amqp_url
                .as_deref()
                .ok_or_else(|| TransportError::Connection("AMQP_URL is not set".into()))?;
            let transport = RabbitMqTransport::connect(url, config.poll_wait_secs).await?;
            Ok(Arc::new(transport))
        }
        "sqs" => {
            let transport = SqsTransport::new(config).await?;
            Ok(Arc::new(transport))
        }
        other => Err(TransportError::Connection(format!("unknown transport backend '{other}'"))),
    }
}
