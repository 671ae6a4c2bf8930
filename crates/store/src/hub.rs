//! In-process pub/sub fan-out of envelope updates to SSE subscribers.
//!
//! One gateway instance may be watched by many clients at once, so every
//! applied update is broadcast to every subscriber currently registered
//! for that envelope, not re-fetched from Postgres per viewer.

use std::collections::HashMap;
use std::sync::Arc;

use asya_envelope::EnvelopeUpdate;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 10;

#[derive(Default)]
pub struct SubscriberHub {
    subscribers: RwLock<HashMap<String, Vec<mpsc::Sender<EnvelopeUpdate>>>>,
}

impl SubscriberHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new SSE subscriber for `envelope_id`, returning the
    /// receiving half of its channel.
    pub async fn subscribe(&self, envelope_id: &str) -> mpsc::Receiver<EnvelopeUpdate> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers.write().await.entry(envelope_id.to_string()).or_default().push(tx);
        rx
    }

    /// Broadcasts `update` to every live subscriber of its envelope. A full
    /// buffer drops the update for that subscriber only (bounded drop, per
    /// `spec.md` §4.4/§8 invariant 7); only a closed channel (client
    /// disconnected) removes the subscriber.
    pub async fn publish(&self, update: EnvelopeUpdate) {
        let mut subscribers = self.subscribers.write().await;
        let Some(senders) = subscribers.get_mut(&update.envelope_id) else { return };
        senders.retain(|tx| match tx.try_send(update.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        });
        if senders.is_empty() {
            subscribers.remove(&update.envelope_id);
        }
    }

    /// Drops all subscribers for an envelope, used once it reaches a
    /// terminal state and no further updates will ever be published.
    pub async fn unsubscribe_all(&self, envelope_id: &str) {
        self.subscribers.write().await.remove(envelope_id);
    }

    pub async fn subscriber_count(&self, envelope_id: &str) -> usize {
        self.subscribers.read().await.get(envelope_id).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asya_envelope::EnvelopeStatus;

    fn update(envelope_id: &str) -> EnvelopeUpdate {
        EnvelopeUpdate::terminal(envelope_id, EnvelopeStatus::Succeeded, Some(serde_json::json!({})), None)
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let hub = SubscriberHub::new();
        let mut a = hub.subscribe("e1").await;
        let mut b = hub.subscribe("e1").await;

        hub.publish(update("e1")).await;

        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }

    #[tokio::test]
    async fn publish_does_not_cross_envelopes() {
        let hub = SubscriberHub::new();
        let mut a = hub.subscribe("e1").await;

        hub.publish(update("e2")).await;

        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_next_publish() {
        let hub = SubscriberHub::new();
        let rx = hub.subscribe("e1").await;
        drop(rx);

        hub.publish(update("e1")).await;

        assert_eq!(hub.subscriber_count("e1").await, 0);
    }

    #[tokio::test]
    async fn full_subscriber_buffer_drops_update_but_keeps_subscriber() {
        let hub = SubscriberHub::new();
        let mut rx = hub.subscribe("e1").await;

        for _ in 0..SUBSCRIBER_CHANNEL_CAPACITY {
            hub.publish(update("e1")).await;
        }
        assert_eq!(hub.subscriber_count("e1").await, 1);

        // One more publish overflows the bounded channel; it's dropped for
        // this subscriber only, not treated as a disconnect.
        hub.publish(update("e1")).await;
        assert_eq!(hub.subscriber_count("e1").await, 1);

        for _ in 0..SUBSCRIBER_CHANNEL_CAPACITY {
            assert!(rx.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn unsubscribe_all_clears_registry() {
        let hub = SubscriberHub::new();
        let _rx = hub.subscribe("e1").await;
        assert_eq!(hub.subscriber_count("e1").await, 1);

        hub.unsubscribe_all("e1").await;
        assert_eq!(hub.subscriber_count("e1").await, 0);
    }
}
