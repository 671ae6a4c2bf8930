//! Fire-and-forget progress reporting to the gateway.
//!
//! The gateway is the authority on `progress_percent` (it knows the
//! envelope's persisted route length); the sidecar's own computation is
//! advisory and only used for its own logs.

use asya_envelope::EnvelopeState;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
struct ProgressBody<'a> {
    id: &'a str,
    actor: &'a str,
    current_actor_idx: usize,
    status: EnvelopeState,
    message: Option<String>,
    progress_percent: f64,
}

pub struct ProgressReporter {
    client: reqwest::Client,
    gateway_url: Option<String>,
}

impl ProgressReporter {
    pub fn new(gateway_url: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), gateway_url }
    }

    /// Posts `{GATEWAY_URL}/envelopes/{id}/progress`. Never fails the
    /// caller: errors are logged at `warn` and swallowed, matching the
    /// "never block the pipeline, never fail the envelope" rule.
    pub async fn report(&self, envelope_id: &str, actor: &str, current_actor_idx: usize, status: EnvelopeState, message: Option<String>, progress_percent: f64) {
        let Some(base) = self.gateway_url.as_deref() else { return };
        let body = ProgressBody { id: envelope_id, actor, current_actor_idx, status, message, progress_percent };
        let url = format!("{}/envelopes/{}/progress", base.trim_end_matches('/'), envelope_id);

        if let Err(err) = self.client.post(&url).json(&body).send().await {
            warn!(envelope_id, actor, error = %err, "progress report failed");
        }
    }
}
