//! Terminal collapse: background readers that fold `happy-end`/`error-end`
//! queue traffic into the store as terminal updates.
//!
//! Per `spec.md` §4.4, the consumer extracts the envelope id from the
//! message's top-level `id`, falling back to `route.metadata.job_id`; a
//! missing id is logged and the message dropped, and a message body that
//! doesn't even parse as JSON is logged and acked anyway so a single bad
//! message can't wedge the queue behind repeated redelivery.

use std::sync::Arc;
use std::time::Duration;

use asya_envelope::EnvelopeStatus;
use asya_transport::Message;
use serde_json::Value;
use tracing::{error, warn};

use crate::state::AppState;

pub fn spawn_result_consumers(state: Arc<AppState>) {
    let happy_end = state.config.step_happy_end.clone();
    let error_end = state.config.step_error_end.clone();
    spawn_consumer(state.clone(), happy_end, EnvelopeStatus::Succeeded);
    spawn_consumer(state, error_end, EnvelopeStatus::Failed);
}

fn spawn_consumer(state: Arc<AppState>, queue: String, status: EnvelopeStatus) {
    tokio::spawn(async move {
        while !state.shutdown.is_cancelled() {
            let messages = match state.transport.receive(&state.shutdown, &queue, state.config.result_poll_max_messages).await {
                Ok(messages) => messages,
                Err(err) => {
                    error!(queue = %queue, error = %err, "result consumer receive failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };
            for message in &messages {
                handle_message(&state, message, status).await;
            }
        }
    });
}

async fn handle_message(state: &Arc<AppState>, message: &Message, status: EnvelopeStatus) {
    let parsed: Option<Value> = match serde_json::from_slice(&message.body) {
        Ok(v) => Some(v),
        Err(err) => {
            warn!(error = %err, "terminal message body is not valid JSON, dropping");
            None
        }
    };

    if let Some(parsed) = &parsed {
        match extract_id(parsed) {
            Some(id) => {
                let (result, error) = result_and_error(parsed, status);
                if let Err(err) = state.store.complete(&state.shutdown, &id, status, result, error).await {
                    warn!(envelope_id = %id, error = %err, "failed to apply terminal update");
                }
            }
            None => warn!("terminal message has no id (checked top-level `id` and `route.metadata.job_id`), dropping"),
        }
    }

    if let Err(err) = state.transport.ack(&state.shutdown, message).await {
        warn!(error = %err, "failed to ack terminal message");
    }
}

fn extract_id(parsed: &Value) -> Option<String> {
    parsed
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| parsed.pointer("/route/metadata/job_id").and_then(Value::as_str).map(str::to_string))
}

fn result_and_error(parsed: &Value, status: EnvelopeStatus) -> (Option<Value>, Option<String>) {
    if status == EnvelopeStatus::Succeeded {
        let result = parsed.get("result").filter(|v| !v.is_null()).or_else(|| parsed.get("payload")).cloned();
        (result, None)
    } else {
        let error = parsed
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "actor reported failure".to_string());
        (None, Some(error))
    }
}
