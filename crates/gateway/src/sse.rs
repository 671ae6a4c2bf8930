//! SSE Stream Bridge: turns the store's replay log plus live subscription
//! channel into one continuous event stream per client.
//!
//! Per `spec.md` §4.5: subscribe, flush every prior update in timestamp
//! order, then forward live updates; close the stream right after writing
//! the terminal event. Disconnect is handled implicitly — dropping the
//! axum response stream drops the forwarding task's sender, which drops
//! the subscription's receiver, which the hub prunes on its next publish.

use std::convert::Infallible;
use std::sync::Arc;

use asya_envelope::EnvelopeUpdate;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::error::GatewayError;
use crate::state::AppState;

const BRIDGE_CHANNEL_CAPACITY: usize = 16;

fn is_terminal(update: &EnvelopeUpdate) -> bool {
    update.status.map(|s| s.is_terminal()).unwrap_or(false)
}

/// Builds the bridged event stream for one envelope. Returns
/// `GatewayError::NotFound` if the envelope doesn't exist, so the caller
/// can return a plain 404 instead of opening a stream that never emits.
pub async fn bridge(state: Arc<AppState>, envelope_id: String) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    if state.store.get(&state.shutdown, &envelope_id).await?.is_none() {
        return Err(GatewayError::NotFound(envelope_id));
    }

    // Subscribed before the replay read so no update published in between is missed.
    let mut live = state.store.subscribe(&envelope_id).await;
    let replay = state.store.get_updates(&state.shutdown, &envelope_id).await?;

    let (tx, rx) = mpsc::channel::<EnvelopeUpdate>(BRIDGE_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        for update in replay {
            let terminal = is_terminal(&update);
            if tx.send(update).await.is_err() {
                return;
            }
            if terminal {
                return;
            }
        }
        while let Some(update) = live.recv().await {
            let terminal = is_terminal(&update);
            if tx.send(update).await.is_err() {
                return;
            }
            if terminal {
                return;
            }
        }
    });

    let events = ReceiverStream::new(rx).map(|update| {
        let data = serde_json::to_string(&update).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event("update").data(data))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
