//! The persistence seam `EnvelopeStore` runs on top of.
//!
//! Production runs on [`crate::pg::PgBackend`]; router and gateway unit
//! tests run on [`crate::memory::InMemoryBackend`] so they don't need a
//! live Postgres instance.

use async_trait::async_trait;
use asya_envelope::{Envelope, EnvelopeUpdate};
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

/// The persistence seam, parameterized over `ctx` so every call can honor
/// cancellation the way `spec.md` §5 requires of "store reads/writes" —
/// they "block on the database connection pool" and must return promptly
/// with `context_cancelled` rather than waiting the call out.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn insert_envelope(&self, ctx: &CancellationToken, envelope: &Envelope) -> Result<(), StoreError>;

    async fn get_envelope(&self, ctx: &CancellationToken, id: &str) -> Result<Option<Envelope>, StoreError>;

    /// Persists `update`: appends it to the envelope's history and applies
    /// it to the envelope's current-state row, returning the new snapshot.
    async fn apply_update(&self, ctx: &CancellationToken, update: &EnvelopeUpdate) -> Result<Envelope, StoreError>;

    async fn list_updates(&self, ctx: &CancellationToken, envelope_id: &str) -> Result<Vec<EnvelopeUpdate>, StoreError>;
}
