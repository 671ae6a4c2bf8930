//! Per-envelope deadline timers.
//!
//! An envelope with a `timeout_sec` gets a background timer. If the
//! envelope hasn't reached a terminal state by the time the timer fires,
//! the registry calls back into the store to fail it rather than leaving
//! it stuck at whatever hop stopped reporting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

#[derive(Default)]
pub struct TimeoutRegistry {
    cancels: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl TimeoutRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Arms a deadline for `envelope_id`. If the timer elapses before
    /// [`TimeoutRegistry::cancel`] is called, `on_expire` runs.
    pub async fn arm<F, Fut>(self: &Arc<Self>, envelope_id: String, after: Duration, on_expire: F)
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.cancel(&envelope_id).await;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.cancels.lock().await.insert(envelope_id.clone(), cancel_tx);

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    debug!(envelope_id, "deadline elapsed");
                    on_expire(envelope_id).await;
                }
                _ = cancel_rx => {
                    debug!(envelope_id, "deadline cancelled");
                }
            }
        });
    }

    /// Cancels a pending deadline, if one is armed. Called once an
    /// envelope reaches a terminal state on its own.
    pub async fn cancel(&self, envelope_id: &str) {
        if let Some(tx) = self.cancels.lock().await.remove(envelope_id) {
            let _ = tx.send(());
        }
    }

    pub async fn is_armed(&self, envelope_id: &str) -> bool {
        self.cancels.lock().await.contains_key(envelope_id)
    }
}
