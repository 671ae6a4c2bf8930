//! `EnvelopeStore`: the single entry point the gateway talks to.
//!
//! Wraps a [`StoreBackend`] with the subscriber hub and the timeout
//! registry so callers never have to juggle the three separately: every
//! write goes through here, gets persisted, fans out to SSE watchers, and
//! re-arms or cancels the envelope's deadline as its status demands.

use std::sync::Arc;
use std::time::Duration;

use asya_envelope::{compute_percent, Envelope, EnvelopeState, EnvelopeStatus, EnvelopeUpdate};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backend::StoreBackend;
use crate::error::StoreError;
use crate::hub::SubscriberHub;
use crate::timeout_registry::TimeoutRegistry;

/// The terminal update applied when an envelope's deadline elapses without
/// the route ever reaching a terminal state on its own.
const TIMEOUT_ERROR_MESSAGE: &str = "envelope timed out";

pub struct EnvelopeStore {
    backend: Arc<dyn StoreBackend>,
    hub: Arc<SubscriberHub>,
    timeouts: Arc<TimeoutRegistry>,
}

impl EnvelopeStore {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Arc<Self> {
        Arc::new(Self { backend, hub: SubscriberHub::new(), timeouts: TimeoutRegistry::new() })
    }

    /// Persists a freshly built envelope and arms its deadline, if any.
    /// Fails `duplicate_id` if the id already exists.
    pub async fn create(self: &Arc<Self>, ctx: &CancellationToken, envelope: Envelope) -> Result<Envelope, StoreError> {
        self.backend.insert_envelope(ctx, &envelope).await?;
        self.arm_timeout_if_needed(&envelope);
        Ok(envelope)
    }

    /// Persists every sibling produced by a fan-out as independent, equally
    /// first-class envelopes.
    pub async fn create_many(self: &Arc<Self>, ctx: &CancellationToken, envelopes: Vec<Envelope>) -> Result<Vec<Envelope>, StoreError> {
        for envelope in &envelopes {
            self.backend.insert_envelope(ctx, envelope).await?;
            self.arm_timeout_if_needed(envelope);
        }
        Ok(envelopes)
    }

    pub async fn get(&self, ctx: &CancellationToken, id: &str) -> Result<Option<Envelope>, StoreError> {
        self.backend.get_envelope(ctx, id).await
    }

    /// Applies an in-flight progress report: advisory status only, no
    /// terminal transition, computed against the envelope's own route.
    /// Maps to the cheap `UpdateProgress` path the sidecar's
    /// `/envelopes/{id}/progress` endpoint uses (`spec.md` §4.4).
    pub async fn update_progress(
        self: &Arc<Self>,
        ctx: &CancellationToken,
        envelope_id: &str,
        actor: &str,
        state: EnvelopeState,
        message: Option<String>,
    ) -> Result<Envelope, StoreError> {
        let envelope = self
            .backend
            .get_envelope(ctx, envelope_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(envelope_id.to_string()))?;

        let actor_idx = envelope.route.actors.iter().position(|a| a == actor).unwrap_or(envelope.route.current);
        let percent = compute_percent(envelope.route.actors.len(), actor_idx, state);

        let update = EnvelopeUpdate::progress(envelope_id, actor, actor_idx, state, percent, message);
        self.apply(ctx, update).await
    }

    /// Persists a route rewrite an actor returned alongside its payload.
    /// The stored `route.actors` is *replaced*, not merged, and
    /// `total_actors`/`current_actor_name` are recomputed from it
    /// (`spec.md` §4.4 route-rewrite persistence). Does not transition
    /// status.
    pub async fn apply_route_rewrite(
        self: &Arc<Self>,
        ctx: &CancellationToken,
        envelope_id: &str,
        route: &asya_envelope::Route,
        message: Option<String>,
    ) -> Result<Envelope, StoreError> {
        let update = EnvelopeUpdate::route_rewrite(envelope_id, route, message);
        self.apply(ctx, update).await
    }

    /// Applies a terminal update (success or failure) and cancels the
    /// envelope's deadline timer, since it no longer needs one. A no-op
    /// (returns `terminal`) if the envelope already reached a terminal
    /// state — this is what makes at-least-once redelivery of a terminal
    /// message safe (S6 in `spec.md` §8).
    pub async fn complete(
        self: &Arc<Self>,
        ctx: &CancellationToken,
        envelope_id: &str,
        status: EnvelopeStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Envelope, StoreError> {
        let update = EnvelopeUpdate::terminal(envelope_id, status, result, error);
        self.apply(ctx, update).await
    }

    async fn apply(self: &Arc<Self>, ctx: &CancellationToken, update: EnvelopeUpdate) -> Result<Envelope, StoreError> {
        let envelope = self.backend.apply_update(ctx, &update).await?;
        self.hub.publish(update).await;
        if envelope.is_terminal() {
            self.timeouts.cancel(&envelope.id).await;
            self.hub.unsubscribe_all(&envelope.id).await;
        }
        Ok(envelope)
    }

    pub async fn get_updates(&self, ctx: &CancellationToken, envelope_id: &str) -> Result<Vec<EnvelopeUpdate>, StoreError> {
        self.backend.list_updates(ctx, envelope_id).await
    }

    /// Registers a new SSE watcher for `envelope_id`.
    pub async fn subscribe(&self, envelope_id: &str) -> mpsc::Receiver<EnvelopeUpdate> {
        self.hub.subscribe(envelope_id).await
    }

    /// Whether `envelope_id` is still in flight (exists, isn't terminal,
    /// and hasn't passed its deadline).
    pub async fn is_active(&self, ctx: &CancellationToken, envelope_id: &str) -> Result<bool, StoreError> {
        match self.backend.get_envelope(ctx, envelope_id).await? {
            Some(envelope) => {
                if envelope.is_terminal() {
                    return Ok(false);
                }
                match envelope.deadline {
                    Some(deadline) => Ok(chrono::Utc::now() < deadline),
                    None => Ok(true),
                }
            }
            None => Ok(false),
        }
    }

    fn arm_timeout_if_needed(self: &Arc<Self>, envelope: &Envelope) {
        let Some(timeout_sec) = envelope.timeout_sec.filter(|t| *t > 0) else { return };
        let envelope_id = envelope.id.clone();
        let store = self.clone();
        let timeouts = self.timeouts.clone();
        tokio::spawn(async move {
            timeouts
                .arm(envelope_id.clone(), Duration::from_secs(timeout_sec), move |id| {
                    let store = store.clone();
                    async move {
                        let ctx = CancellationToken::new();
                        if let Err(err) =
                            store.complete(&ctx, &id, EnvelopeStatus::Failed, None, Some(TIMEOUT_ERROR_MESSAGE.to_string())).await
                        {
                            warn!(envelope_id = %id, error = %err, "failed to apply timeout expiry");
                        }
                    }
                })
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use asya_envelope::Route;

    fn route(actors: &[&str]) -> Route {
        Route::new(actors.iter().map(|s| s.to_string()).collect())
    }

    fn ctx() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = EnvelopeStore::new(InMemoryBackend::new());
        let envelope = Envelope::new(route(&["a"]), serde_json::json!({"x": 1}));
        let id = envelope.id.clone();
        store.create(&ctx(), envelope).await.unwrap();

        let fetched = store.get(&ctx(), &id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn progress_update_computes_percent_from_route_position() {
        let store = EnvelopeStore::new(InMemoryBackend::new());
        let envelope = Envelope::new(route(&["a", "b"]), Value::Null);
        let id = envelope.id.clone();
        store.create(&ctx(), envelope).await.unwrap();

        let updated = store.update_progress(&ctx(), &id, "b", EnvelopeState::Processing, None).await.unwrap();
        assert_eq!(updated.status, EnvelopeStatus::Running);

        let updates = store.get_updates(&ctx(), &id).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert!((updates[0].progress_percent.unwrap() - 83.333).abs() < 0.01);
    }

    #[tokio::test]
    async fn route_rewrite_replaces_actors_and_recomputes_total() {
        let store = EnvelopeStore::new(InMemoryBackend::new());
        let envelope = Envelope::new(route(&["a", "b"]), Value::Null);
        let id = envelope.id.clone();
        store.create(&ctx(), envelope).await.unwrap();

        let mut rewritten = route(&["a", "b", "c", "d"]);
        rewritten.current = 1;
        store.apply_route_rewrite(&ctx(), &id, &rewritten, None).await.unwrap();

        let fetched = store.get(&ctx(), &id).await.unwrap().unwrap();
        assert_eq!(fetched.total_actors, 4);
        assert_eq!(fetched.route.actors, vec!["a", "b", "c", "d"]);
        assert_eq!(fetched.current_actor_name.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn complete_marks_terminal_and_stops_accepting_updates() {
        let store = EnvelopeStore::new(InMemoryBackend::new());
        let envelope = Envelope::new(route(&["a"]), Value::Null);
        let id = envelope.id.clone();
        store.create(&ctx(), envelope).await.unwrap();

        store.complete(&ctx(), &id, EnvelopeStatus::Succeeded, Some(serde_json::json!({"ok": true})), None).await.unwrap();
        assert!(!store.is_active(&ctx(), &id).await.unwrap());

        let err = store.update_progress(&ctx(), &id, "a", EnvelopeState::Processing, None).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn second_terminal_update_after_completion_is_a_no_op() {
        let store = EnvelopeStore::new(InMemoryBackend::new());
        let envelope = Envelope::new(route(&["a"]), Value::Null);
        let id = envelope.id.clone();
        store.create(&ctx(), envelope).await.unwrap();

        store.complete(&ctx(), &id, EnvelopeStatus::Succeeded, Some(serde_json::json!({"ok": true})), None).await.unwrap();
        let err = store.complete(&ctx(), &id, EnvelopeStatus::Failed, None, Some("late duplicate".into())).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyTerminal(_)));

        let fetched = store.get(&ctx(), &id).await.unwrap().unwrap();
        assert_eq!(fetched.status, EnvelopeStatus::Succeeded);
    }

    #[tokio::test]
    async fn is_active_false_for_unknown_envelope() {
        let store = EnvelopeStore::new(InMemoryBackend::new());
        assert!(!store.is_active(&ctx(), "missing").await.unwrap());
    }

    #[tokio::test]
    async fn is_active_false_past_deadline() {
        let store = EnvelopeStore::new(InMemoryBackend::new());
        let mut envelope = Envelope::new(route(&["a"]), Value::Null);
        envelope.timeout_sec = None; // don't arm the background timer; test is_active directly
        envelope.deadline = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
        let id = envelope.id.clone();
        store.create(&ctx(), envelope).await.unwrap();
        assert!(!store.is_active(&ctx(), &id).await.unwrap());
    }

    #[tokio::test]
    async fn subscriber_receives_published_update() {
        let store = EnvelopeStore::new(InMemoryBackend::new());
        let envelope = Envelope::new(route(&["a"]), Value::Null);
        let id = envelope.id.clone();
        store.create(&ctx(), envelope).await.unwrap();

        let mut rx = store.subscribe(&id).await;
        store.update_progress(&ctx(), &id, "a", EnvelopeState::Received, None).await.unwrap();

        let update = rx.recv().await.unwrap();
        assert_eq!(update.envelope_id, id);
    }

    #[tokio::test]
    async fn timeout_fails_envelope_that_never_completes() {
        let store = EnvelopeStore::new(InMemoryBackend::new());
        let mut envelope = Envelope::new(route(&["a"]), Value::Null);
        envelope.timeout_sec = Some(1);
        let id = envelope.id.clone();
        store.create(&ctx(), envelope).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1050)).await;

        let fetched = store.get(&ctx(), &id).await.unwrap().unwrap();
        assert_eq!(fetched.status, EnvelopeStatus::Failed);
        assert_eq!(fetched.error.as_deref(), Some(TIMEOUT_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn zero_timeout_sec_does_not_arm_a_timer() {
        let store = EnvelopeStore::new(InMemoryBackend::new());
        let mut envelope = Envelope::new(route(&["a"]), Value::Null);
        envelope.timeout_sec = Some(0);
        let id = envelope.id.clone();
        store.create(&ctx(), envelope).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let fetched = store.get(&ctx(), &id).await.unwrap().unwrap();
        assert_eq!(fetched.status, EnvelopeStatus::Pending);
    }
}
