//! Materializes a tool call into an envelope and publishes it to its first
//! actor's queue. Shared by the MCP `tools/call` backend and the
//! `POST /tools/call` REST shortcut, per `spec.md` §2's control flow:
//! "Gateway receives a tool call, materializes an envelope, persists it,
//! publishes it onto the first actor's queue."

use std::collections::HashMap;
use std::sync::Arc;

use asya_envelope::{Envelope, Route};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use tracing::info;

use crate::error::GatewayError;
use crate::state::AppState;

pub async fn dispatch_tool_call(state: &Arc<AppState>, name: &str, arguments: Value) -> Result<Envelope, GatewayError> {
    let actors = state.catalog.route_for(name);
    let route = Route::new(actors);
    let mut envelope = Envelope::new(route, arguments);

    if let Some(timeout_sec) = state.config.default_timeout_sec {
        envelope.timeout_sec = Some(timeout_sec);
        envelope.deadline = Some(Utc::now() + ChronoDuration::seconds(timeout_sec as i64));
    }

    let envelope = state.store.create(&state.shutdown, envelope).await?;

    let first_actor = envelope
        .route
        .current_actor()
        .ok_or_else(|| GatewayError::Invalid(format!("tool '{name}' resolved to an empty route")))?;

    let body = serde_json::to_vec(&envelope).map_err(|e| GatewayError::Invalid(e.to_string()))?;
    state.transport.send(&state.shutdown, first_actor, body, HashMap::new()).await?;

    info!(envelope_id = %envelope.id, tool = name, actor = first_actor, "dispatched tool call");
    Ok(envelope)
}
