//! In-memory `StoreBackend`, for router/gateway tests that don't want a
//! live Postgres instance.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use asya_envelope::{Envelope, EnvelopeUpdate};
use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::backend::StoreBackend;
use crate::cancellable;
use crate::error::StoreError;

#[derive(Default)]
pub struct InMemoryBackend {
    envelopes: RwLock<HashMap<String, Envelope>>,
    updates: RwLock<HashMap<String, Vec<EnvelopeUpdate>>>,
}

impl InMemoryBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl StoreBackend for InMemoryBackend {
    async fn insert_envelope(&self, ctx: &CancellationToken, envelope: &Envelope) -> Result<(), StoreError> {
        cancellable(ctx, async {
            self.envelopes.write().await.insert(envelope.id.clone(), envelope.clone());
            Ok(())
        })
        .await
    }

    async fn get_envelope(&self, ctx: &CancellationToken, id: &str) -> Result<Option<Envelope>, StoreError> {
        cancellable(ctx, async { Ok(self.envelopes.read().await.get(id).cloned()) }).await
    }

    async fn apply_update(&self, ctx: &CancellationToken, update: &EnvelopeUpdate) -> Result<Envelope, StoreError> {
        cancellable(ctx, async {
        let mut envelopes = self.envelopes.write().await;
        let envelope = envelopes
            .get_mut(&update.envelope_id)
            .ok_or_else(|| StoreError::NotFound(update.envelope_id.clone()))?;

        if envelope.is_terminal() {
            return Err(StoreError::AlreadyTerminal(envelope.id.clone()));
        }

        if let Some(status) = update.status {
            envelope.status = status;
        }
        if let Some(ref actors) = update.actors {
            envelope.route.actors = actors.clone();
        }
        if let Some(idx) = update.current_actor_idx {
            envelope.route.current = idx;
        }
        if update.actors.is_some() || update.current_actor_idx.is_some() {
            envelope.sync_route_derived_fields();
        }
        if let Some(ref message) = update.message {
            envelope.message = Some(message.clone());
        }
        if let Some(percent) = update.progress_percent {
            envelope.progress_percent = percent;
        }
        if matches!(update.envelope_state, Some(asya_envelope::EnvelopeState::Completed)) {
            envelope.actors_completed += 1;
        }
        if let Some(ref result) = update.result {
            envelope.result = Some(result.clone());
        }
        if let Some(ref error) = update.error {
            envelope.error = Some(error.clone());
        }
        envelope.updated_at = Utc::now();
        let snapshot = envelope.clone();
        drop(envelopes);

        self.updates.write().await.entry(update.envelope_id.clone()).or_default().push(update.clone());

            Ok(snapshot)
        })
        .await
    }

    async fn list_updates(&self, ctx: &CancellationToken, envelope_id: &str) -> Result<Vec<EnvelopeUpdate>, StoreError> {
        cancellable(ctx, async { Ok(self.updates.read().await.get(envelope_id).cloned().unwrap_or_default()) }).await
    }
}
