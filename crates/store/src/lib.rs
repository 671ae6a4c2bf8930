//! Envelope persistence, SSE fan-out and deadline timers for the gateway.

pub mod backend;
pub mod error;
pub mod hub;
pub mod memory;
pub mod pg;
pub mod pool;
pub mod store;
pub mod timeout_registry;

pub use backend::StoreBackend;
pub use error::StoreError;
pub use hub::SubscriberHub;
pub use memory::InMemoryBackend;
pub use pg::PgBackend;
pub use pool::init_pg_pool;
pub use store::EnvelopeStore;
pub use timeout_registry::TimeoutRegistry;

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// Races `fut` against `ctx` being cancelled; shared by [`memory::InMemoryBackend`]
/// and [`pg::PgBackend`] so both honor `spec.md` §5's cancellation contract
/// the same way.
pub(crate) async fn cancellable<T>(ctx: &CancellationToken, fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
    tokio::select! {
        _ = ctx.cancelled() => Err(StoreError::ContextCancelled),
        result = fut => result,
    }
}
