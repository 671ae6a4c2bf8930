use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::route::Route;
use crate::status::{EnvelopeState, EnvelopeStatus};

/// One row of an envelope's append-only history.
///
/// Updates are never mutated or deleted; the gateway's `envelopes` table
/// holds only the latest snapshot, while every update that ever applied to
/// an envelope lives here for audit and SSE replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeUpdate {
    pub envelope_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EnvelopeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_state: Option<EnvelopeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_actor_idx: Option<usize>,
    /// A full route replacement, when the actor rewrote its suffix. When
    /// present the store *replaces* (not merges) `route.actors` and
    /// recomputes `total_actors` (see `spec.md` §4.4 route-rewrite
    /// persistence).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EnvelopeUpdate {
    /// An intermediate progress update posted by an actor while it runs.
    pub fn progress(
        envelope_id: impl Into<String>,
        actor: impl Into<String>,
        current_actor_idx: usize,
        state: EnvelopeState,
        percent: f64,
        message: Option<String>,
    ) -> Self {
        Self {
            envelope_id: envelope_id.into(),
            status: Some(EnvelopeStatus::Running),
            envelope_state: Some(state),
            actor: Some(actor.into()),
            current_actor_idx: Some(current_actor_idx),
            actors: None,
            message,
            progress_percent: Some(percent),
            result: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// A route-rewrite update: carries the actor's rewritten suffix but no
    /// status transition of its own (the envelope is still `running`).
    pub fn route_rewrite(envelope_id: impl Into<String>, route: &Route, message: Option<String>) -> Self {
        Self {
            envelope_id: envelope_id.into(),
            status: Some(EnvelopeStatus::Running),
            envelope_state: None,
            actor: route.current_actor().map(str::to_string),
            current_actor_idx: Some(route.current),
            actors: Some(route.actors.clone()),
            message,
            progress_percent: None,
            result: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// A terminal update: either a result or an error, never both.
    pub fn terminal(
        envelope_id: impl Into<String>,
        status: EnvelopeStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Self {
        Self {
            envelope_id: envelope_id.into(),
            status: Some(status),
            envelope_state: Some(EnvelopeState::Completed),
            actor: None,
            current_actor_idx: None,
            actors: None,
            message: None,
            progress_percent: Some(100.0),
            result,
            error,
            created_at: Utc::now(),
        }
    }
}
