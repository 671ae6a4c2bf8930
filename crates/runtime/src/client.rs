//! Client for the per-pod actor runtime socket.
//!
//! Every invocation opens a fresh connection, writes the request, shuts
//! down the write half, and reads until the actor closes its end. There is
//! no multiplexing and no keep-alive: one envelope in, one response out,
//! one socket. This keeps a misbehaving actor process from being able to
//! wedge a shared connection for every other envelope in flight.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;

#[derive(Debug, Clone)]
pub struct RuntimeClient {
    socket_path: String,
    call_timeout: Duration,
}

impl RuntimeClient {
    pub fn new(socket_path: impl Into<String>, call_timeout: Duration) -> Self {
        Self { socket_path: socket_path.into(), call_timeout }
    }

    /// Sends `request` to the actor and returns its raw JSON response.
    ///
    /// The whole exchange — connect, write, shutdown, read-to-EOF, parse —
    /// is wrapped in a single timeout so a hung actor fails the envelope
    /// instead of leaking a socket. `ctx` is additionally raced against the
    /// call: a cancelled token aborts the exchange in flight with
    /// [`RuntimeError::ContextCancelled`] instead of waiting out the timeout
    /// (`spec.md` §5: "Runtime.Invoke — blocks until response, EOF, or
    /// timeout", honoring cancellation on top of that).
    pub async fn invoke(&self, ctx: &CancellationToken, request: &Value) -> Result<Value, RuntimeError> {
        tokio::select! {
            _ = ctx.cancelled() => Err(RuntimeError::ContextCancelled),
            result = self.invoke_with_timeout(request) => result,
        }
    }

    async fn invoke_with_timeout(&self, request: &Value) -> Result<Value, RuntimeError> {
        timeout(self.call_timeout, self.invoke_inner(request))
            .await
            .map_err(|_| RuntimeError::Timeout(self.call_timeout.as_millis() as u64))?
    }

    async fn invoke_inner(&self, request: &Value) -> Result<Value, RuntimeError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| RuntimeError::Connect { path: self.socket_path.clone(), source: e })?;

        let body = serde_json::to_vec(request).expect("Value always serializes");
        stream.write_all(&body).await.map_err(RuntimeError::Write)?;
        stream.shutdown().await.map_err(RuntimeError::Write)?;

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.map_err(RuntimeError::Read)?;

        serde_json::from_slice(&buf).map_err(|e| RuntimeError::InvalidResponse(e.to_string()))
    }
}
