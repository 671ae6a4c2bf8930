//! The per-envelope message pump: receive, invoke, classify, route, ack.
//!
//! Implements the sequence and the C1-C6 classification table from
//! `spec.md` §4.3: one envelope at a time per prefetch slot, nothing acked
//! until the resulting envelope(s) have been accepted by the transport.

use std::collections::HashMap;
use std::sync::Arc;

use asya_envelope::{compute_percent, fan_out, validate_route_rewrite, Envelope, EnvelopeState, Route};
use asya_runtime::{classify_response, ResponseClassification, RuntimeClient, RuntimeError};
use asya_transport::{Message, Transport};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RouterConfig;
use crate::progress::ProgressReporter;

/// Drives one actor's queue: receive -> invoke -> classify -> publish -> ack.
pub struct Pump {
    actor_name: String,
    transport: Arc<dyn Transport>,
    runtime: RuntimeClient,
    progress: ProgressReporter,
    step_happy_end: String,
    step_error_end: String,
    is_end_actor: bool,
    prefetch: u32,
    shutdown: CancellationToken,
}

impl Pump {
    pub fn new(config: &RouterConfig, transport: Arc<dyn Transport>, runtime: RuntimeClient, shutdown: CancellationToken) -> Self {
        Self {
            actor_name: config.actor_name.clone(),
            transport,
            runtime,
            progress: ProgressReporter::new(config.gateway_url.clone()),
            step_happy_end: config.step_happy_end.clone(),
            step_error_end: config.step_error_end.clone(),
            is_end_actor: config.is_end_actor,
            prefetch: config.prefetch,
            shutdown,
        }
    }

    /// Runs the receive loop forever. A transport error on receive is
    /// logged and retried; it never brings the process down (§7
    /// `transport_error`: "receive loop logs and continues"). Returns once
    /// the shutdown token fires, so the sidecar stops polling for new work
    /// while letting in-flight `process_message` calls race their own
    /// cancellation.
    pub async fn run(&self) {
        while !self.shutdown.is_cancelled() {
            match self.transport.receive(&self.shutdown, &self.actor_name, self.prefetch).await {
                Ok(messages) => {
                    for message in messages {
                        self.process_message(&message).await;
                    }
                }
                Err(err) => {
                    warn!(actor = %self.actor_name, error = %err, "receive failed, will retry");
                }
            }
        }
    }

    async fn process_message(&self, message: &Message) {
        let envelope: Envelope = match serde_json::from_slice(&message.body) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.handle_malformed(message, &err).await;
                return;
            }
        };

        self.emit_progress(&envelope, EnvelopeState::Received, None).await;

        if self.is_end_actor {
            self.invoke_and_discard(&envelope).await;
            self.ack_or_warn(message).await;
            return;
        }

        let request = serde_json::to_value(&envelope).unwrap_or(Value::Null);
        let outcome = self.runtime.invoke(&self.shutdown, &request).await;

        self.emit_progress(&envelope, EnvelopeState::Processing, None).await;

        let targets = match outcome {
            Ok(raw) => self.classify_and_route(&envelope, raw),
            Err(err) => {
                let code = runtime_error_code(&err);
                vec![(self.step_error_end.clone(), self.error_envelope(&envelope, Some(code), err.to_string()))]
            }
        };

        if !self.publish_all(&targets).await {
            self.nack_or_warn(message).await;
            return;
        }

        self.emit_progress(&envelope, EnvelopeState::Completed, None).await;
        self.ack_or_warn(message).await;
    }

    /// End-actor mode: the actor's own handler owns posting the terminal
    /// result to the gateway (`POST /envelopes/{id}/final`); the sidecar
    /// just drives the call and discards whatever comes back.
    async fn invoke_and_discard(&self, envelope: &Envelope) {
        let request = serde_json::to_value(envelope).unwrap_or(Value::Null);
        if let Err(err) = self.runtime.invoke(&self.shutdown, &request).await {
            warn!(envelope_id = %envelope.id, actor = %self.actor_name, error = %err, "end-actor runtime invoke failed");
        }
    }

    fn classify_and_route(&self, original: &Envelope, raw: Value) -> Vec<(String, Envelope)> {
        match classify_response(&raw) {
            ResponseClassification::Single(value) => match self.route_single(original, value) {
                Ok(target) => vec![target],
                Err((code, message)) => vec![(self.step_error_end.clone(), self.error_envelope(original, Some(code), message))],
            },
            ResponseClassification::FanOut(items) => self.route_fan_out(original, items),
            ResponseClassification::Empty => {
                let mut envelope = original.clone();
                envelope.payload = Value::Null;
                vec![(self.step_happy_end.clone(), envelope)]
            }
            ResponseClassification::Error { code, message } => {
                vec![(self.step_error_end.clone(), self.error_envelope(original, code, message))]
            }
        }
    }

    /// C1/C2: a single JSON object, either a plain payload or an
    /// envelope-mode `{payload, route, headers}` wrapper.
    fn route_single(&self, original: &Envelope, value: Value) -> Result<(String, Envelope), (String, String)> {
        let (payload, route, headers) = match value.get("route") {
            Some(route_value) => {
                let proposed: Route = serde_json::from_value(route_value.clone())
                    .map_err(|e| ("processing_error".to_string(), format!("invalid route in envelope-mode response: {e}")))?;
                validate_route_rewrite(&original.route, &proposed).map_err(|e| ("processing_error".to_string(), e.to_string()))?;
                let payload = value.get("payload").cloned().unwrap_or(Value::Null);
                let headers = value
                    .get("headers")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_else(|| original.headers.clone());
                (payload, proposed, headers)
            }
            None => (value, original.route.clone(), original.headers.clone()),
        };

        let advanced = route.advanced();
        let mut next = original.clone();
        next.route = advanced;
        next.payload = payload;
        next.headers = headers;
        next.sync_route_derived_fields();
        next.progress_percent = compute_percent(next.route.actors.len(), next.route.current, EnvelopeState::Received);

        let queue = next
            .route
            .current_actor()
            .map(str::to_string)
            .unwrap_or_else(|| self.step_happy_end.clone());
        Ok((queue, next))
    }

    /// C3: a JSON array of N >= 1 payloads. Every child shares the route
    /// advanced past the actor that produced them (`spec.md` §3 fan-out
    /// identity), then is routed independently as C1 or C2.
    fn route_fan_out(&self, original: &Envelope, items: Vec<Value>) -> Vec<(String, Envelope)> {
        let mut template = original.clone();
        template.route = original.route.advanced();

        let children = match fan_out(&template, items) {
            Ok(children) => children,
            Err(err) => {
                return vec![(self.step_error_end.clone(), self.error_envelope(original, Some("processing_error".to_string()), err.to_string()))];
            }
        };

        children
            .into_iter()
            .map(|mut child| {
                child.sync_route_derived_fields();
                child.progress_percent = compute_percent(child.route.actors.len(), child.route.current, EnvelopeState::Received);
                let queue = child.route.current_actor().map(str::to_string).unwrap_or_else(|| self.step_happy_end.clone());
                (queue, child)
            })
            .collect()
    }

    /// C5/C6: the route is frozen at the actor that failed; the error is
    /// recorded on the envelope and, redundantly, as a synthetic header so
    /// a broker-level consumer can filter on it without parsing the body.
    fn error_envelope(&self, original: &Envelope, code: Option<String>, message: String) -> Envelope {
        let mut envelope = original.clone();
        if let Some(code) = code {
            envelope.headers.insert("error_code".to_string(), Value::String(code));
        }
        envelope.error = Some(message);
        envelope
    }

    async fn publish_all(&self, targets: &[(String, Envelope)]) -> bool {
        for (queue, envelope) in targets {
            let body = match serde_json::to_vec(envelope) {
                Ok(body) => body,
                Err(err) => {
                    warn!(envelope_id = %envelope.id, error = %err, "failed to serialize outgoing envelope");
                    return false;
                }
            };
            if let Err(err) = self.transport.send(&self.shutdown, queue, body, HashMap::new()).await {
                warn!(envelope_id = %envelope.id, queue, error = %err, "publish failed");
                return false;
            }
        }
        true
    }

    async fn emit_progress(&self, envelope: &Envelope, state: EnvelopeState, message: Option<String>) {
        let percent = compute_percent(envelope.route.actors.len(), envelope.route.current, state);
        self.progress.report(&envelope.id, &self.actor_name, envelope.route.current, state, message, percent).await;
    }

    /// "Malformed envelope on receive -> publish a minimal error envelope
    /// with the original id (if extractable) to error-end; ack the input
    /// to stop poison loops" (`spec.md` §4.3).
    async fn handle_malformed(&self, message: &Message, err: &serde_json::Error) {
        warn!(error = %err, "received malformed envelope, routing to error-end");
        let id = extract_id(&message.body).unwrap_or_else(|| "unknown".to_string());
        let minimal = serde_json::json!({
            "id": id,
            "status": "failed",
            "route": {"actors": [], "current": 0, "metadata": {}},
            "headers": {},
            "payload": Value::Null,
            "error": format!("parse_error: {err}"),
            "progress_percent": 0.0,
            "current_actor_idx": 0,
            "actors_completed": 0,
            "total_actors": 0,
            "created_at": chrono::Utc::now(),
            "updated_at": chrono::Utc::now(),
        });
        if let Ok(body) = serde_json::to_vec(&minimal) {
            if let Err(err) = self.transport.send(&self.shutdown, &self.step_error_end, body, HashMap::new()).await {
                warn!(error = %err, "failed to publish minimal error envelope for malformed input");
            }
        }
        self.ack_or_warn(message).await;
    }

    async fn ack_or_warn(&self, message: &Message) {
        if let Err(err) = self.transport.ack(&self.shutdown, message).await {
            warn!(error = %err, "ack failed");
        } else {
            info!(message_id = %message.id, "acked");
        }
    }

    async fn nack_or_warn(&self, message: &Message) {
        if let Err(err) = self.transport.nack(&self.shutdown, message).await {
            warn!(error = %err, "nack failed");
        }
    }
}

fn extract_id(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("id").and_then(Value::as_str).map(str::to_string)
}

fn runtime_error_code(err: &RuntimeError) -> String {
    match err {
        RuntimeError::Timeout(_) => "runtime_timeout".to_string(),
        _ => "runtime_invoke_error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use asya_transport::{TransportError, TransportHealth};
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex;
    use tokio::net::UnixListener;

    #[derive(Default)]
    struct MockTransport {
        queues: Mutex<HashMap<String, Vec<Message>>>,
        acked: StdMutex<Vec<String>>,
        nacked: StdMutex<Vec<String>>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        async fn seed(&self, queue: &str, body: Vec<u8>) {
            self.queues.lock().await.entry(queue.to_string()).or_default().push(Message {
                id: uuid::Uuid::new_v4().to_string(),
                body,
                receipt_handle: format!("{queue}|1"),
                headers: HashMap::new(),
                enqueued_at: Utc::now(),
                delivery_count: 1,
            });
        }

        async fn drain(&self, queue: &str) -> Vec<Message> {
            self.queues.lock().await.remove(queue).unwrap_or_default()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, _ctx: &CancellationToken, queue: &str, body: Vec<u8>, _headers: HashMap<String, String>) -> Result<(), TransportError> {
            self.queues.lock().await.entry(queue.to_string()).or_default().push(Message {
                id: uuid::Uuid::new_v4().to_string(),
                body,
                receipt_handle: format!("{queue}|auto"),
                headers: HashMap::new(),
                enqueued_at: Utc::now(),
                delivery_count: 1,
            });
            Ok(())
        }

        async fn receive(&self, _ctx: &CancellationToken, queue: &str, max_messages: u32) -> Result<Vec<Message>, TransportError> {
            let mut guard = self.queues.lock().await;
            let entry = guard.entry(queue.to_string()).or_default();
            let take = max_messages.min(entry.len() as u32) as usize;
            Ok(entry.drain(..take).collect())
        }

        async fn ack(&self, _ctx: &CancellationToken, message: &Message) -> Result<(), TransportError> {
            self.acked.lock().unwrap().push(message.receipt_handle.clone());
            Ok(())
        }

        async fn nack(&self, _ctx: &CancellationToken, message: &Message) -> Result<(), TransportError> {
            self.nacked.lock().unwrap().push(message.receipt_handle.clone());
            Ok(())
        }

        async fn health_check(&self, _queue: &str) -> Result<TransportHealth, TransportError> {
            Ok(TransportHealth { connected: true, approximate_message_count: Some(0), provider: "mock".into() })
        }
    }

    fn ctx() -> CancellationToken {
        CancellationToken::new()
    }

    fn test_config() -> RouterConfig {
        RouterConfig {
            actor_name: "actor-a".to_string(),
            socket_dir: "/tmp".to_string(),
            runtime_timeout: std::time::Duration::from_secs(5),
            step_happy_end: "happy-end".to_string(),
            step_error_end: "error-end".to_string(),
            is_end_actor: false,
            gateway_url: None,
            prefetch: 1,
            transport: asya_core::config::TransportConfig {
                backend: "rabbitmq".to_string(),
                amqp_url: None,
                aws: asya_core::config::AwsConfig {
                    region: "us-east-1".to_string(),
                    access_key_id: None,
                    secret_access_key: None,
                    session_token: None,
                    endpoint_url: None,
                },
                visibility_timeout_secs: 300,
                poll_wait_secs: 20,
            },
        }
    }

    async fn spawn_handler(response: &'static [u8]) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("actor.sock");
        let listener = UnixListener::bind(&sock_path).unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { break };
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut buf = Vec::new();
                let _ = stream.read_to_end(&mut buf).await;
                let _ = stream.write_all(response).await;
                let _ = stream.shutdown().await;
            }
        });
        let path = sock_path.to_str().unwrap().to_string();
        (dir, path)
    }

    fn sample_envelope(actors: &[&str]) -> Envelope {
        Envelope::new(Route::new(actors.iter().map(|s| s.to_string()).collect()), serde_json::json!({"n": 1}))
    }

    #[tokio::test]
    async fn single_object_response_advances_to_next_actor() {
        let (_dir, sock) = spawn_handler(br#"{"n":2}"#).await;
        let transport = MockTransport::new();
        let envelope = sample_envelope(&["actor-a", "actor-b"]);
        let body = serde_json::to_vec(&envelope).unwrap();
        transport.seed("actor-a", body).await;

        let runtime = RuntimeClient::new(sock, std::time::Duration::from_secs(5));
        let pump = Pump::new(&test_config(), transport.clone(), runtime, ctx());

        let messages = transport.receive(&ctx(), "actor-a", 1).await.unwrap();
        pump.process_message(&messages[0]).await;

        let forwarded = transport.drain("actor-b").await;
        assert_eq!(forwarded.len(), 1);
        let next: Envelope = serde_json::from_slice(&forwarded[0].body).unwrap();
        assert_eq!(next.route.current, 1);
        assert_eq!(next.payload, serde_json::json!({"n": 2}));
    }

    #[tokio::test]
    async fn end_of_route_publishes_to_happy_end() {
        let (_dir, sock) = spawn_handler(br#"{"n":2}"#).await;
        let transport = MockTransport::new();
        let envelope = sample_envelope(&["actor-a"]);
        transport.seed("actor-a", serde_json::to_vec(&envelope).unwrap()).await;

        let runtime = RuntimeClient::new(sock, std::time::Duration::from_secs(5));
        let pump = Pump::new(&test_config(), transport.clone(), runtime, ctx());

        let messages = transport.receive(&ctx(), "actor-a", 1).await.unwrap();
        pump.process_message(&messages[0]).await;

        assert_eq!(transport.drain("happy-end").await.len(), 1);
    }

    #[tokio::test]
    async fn fan_out_response_publishes_three_children() {
        let (_dir, sock) = spawn_handler(br#"[{"i":0},{"i":1},{"i":2}]"#).await;
        let transport = MockTransport::new();
        let mut envelope = sample_envelope(&["actor-a", "actor-b"]);
        envelope.id = "parent-1".to_string();
        transport.seed("actor-a", serde_json::to_vec(&envelope).unwrap()).await;

        let runtime = RuntimeClient::new(sock, std::time::Duration::from_secs(5));
        let pump = Pump::new(&test_config(), transport.clone(), runtime, ctx());

        let messages = transport.receive(&ctx(), "actor-a", 1).await.unwrap();
        pump.process_message(&messages[0]).await;

        let forwarded = transport.drain("actor-b").await;
        assert_eq!(forwarded.len(), 3);
        let ids: Vec<String> = forwarded
            .iter()
            .map(|m| serde_json::from_slice::<Envelope>(&m.body).unwrap().id)
            .collect();
        assert!(ids.contains(&"parent-1".to_string()));
        assert!(ids.contains(&"parent-1-1".to_string()));
        assert!(ids.contains(&"parent-1-2".to_string()));
    }

    #[tokio::test]
    async fn error_document_routes_to_error_end() {
        let (_dir, sock) = spawn_handler(br#"{"error":"bad_input","message":"nope"}"#).await;
        let transport = MockTransport::new();
        let envelope = sample_envelope(&["actor-a", "actor-b"]);
        transport.seed("actor-a", serde_json::to_vec(&envelope).unwrap()).await;

        let runtime = RuntimeClient::new(sock, std::time::Duration::from_secs(5));
        let pump = Pump::new(&test_config(), transport.clone(), runtime, ctx());

        let messages = transport.receive(&ctx(), "actor-a", 1).await.unwrap();
        pump.process_message(&messages[0]).await;

        let forwarded = transport.drain("error-end").await;
        assert_eq!(forwarded.len(), 1);
        let next: Envelope = serde_json::from_slice(&forwarded[0].body).unwrap();
        assert_eq!(next.error.as_deref(), Some("nope"));
        assert_eq!(next.route.current, 0);
    }

    #[tokio::test]
    async fn runtime_timeout_routes_to_error_end() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("actor.sock");
        let listener = UnixListener::bind(&sock_path).unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        });

        let transport = MockTransport::new();
        let envelope = sample_envelope(&["actor-a"]);
        transport.seed("actor-a", serde_json::to_vec(&envelope).unwrap()).await;

        let runtime = RuntimeClient::new(sock_path.to_str().unwrap(), std::time::Duration::from_millis(50));
        let pump = Pump::new(&test_config(), transport.clone(), runtime, ctx());

        let messages = transport.receive(&ctx(), "actor-a", 1).await.unwrap();
        pump.process_message(&messages[0]).await;

        let forwarded = transport.drain("error-end").await;
        assert_eq!(forwarded.len(), 1);
        let next: Envelope = serde_json::from_slice(&forwarded[0].body).unwrap();
        assert!(next.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn malformed_input_is_acked_and_routed_to_error_end() {
        let (_dir, sock) = spawn_handler(br#"{"n":2}"#).await;
        let transport = MockTransport::new();
        transport.seed("actor-a", b"not json at all".to_vec()).await;

        let runtime = RuntimeClient::new(sock, std::time::Duration::from_secs(5));
        let pump = Pump::new(&test_config(), transport.clone(), runtime, ctx());

        let messages = transport.receive(&ctx(), "actor-a", 1).await.unwrap();
        pump.process_message(&messages[0]).await;

        assert_eq!(transport.drain("error-end").await.len(), 1);
        assert_eq!(transport.acked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn end_actor_mode_discards_response_and_does_not_route() {
        let (_dir, sock) = spawn_handler(br#"{"n":2}"#).await;
        let transport = MockTransport::new();
        let envelope = sample_envelope(&["happy-end"]);
        transport.seed("happy-end", serde_json::to_vec(&envelope).unwrap()).await;

        let mut config = test_config();
        config.actor_name = "happy-end".to_string();
        config.is_end_actor = true;

        let runtime = RuntimeClient::new(sock, std::time::Duration::from_secs(5));
        let pump = Pump::new(&config, transport.clone(), runtime, ctx());

        let messages = transport.receive(&ctx(), "happy-end", 1).await.unwrap();
        pump.process_message(&messages[0]).await;

        assert!(transport.drain("actor-b").await.is_empty());
        assert_eq!(transport.acked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn envelope_mode_rewrite_extends_route() {
        let response = br#"{"payload":{"n":9},"route":{"actors":["actor-a","actor-b","actor-c"],"current":0,"metadata":{}}}"#;
        let (_dir, sock) = spawn_handler(response).await;
        let transport = MockTransport::new();
        let envelope = sample_envelope(&["actor-a", "actor-b"]);
        transport.seed("actor-a", serde_json::to_vec(&envelope).unwrap()).await;

        let runtime = RuntimeClient::new(sock, std::time::Duration::from_secs(5));
        let pump = Pump::new(&test_config(), transport.clone(), runtime, ctx());

        let messages = transport.receive(&ctx(), "actor-a", 1).await.unwrap();
        pump.process_message(&messages[0]).await;

        let forwarded = transport.drain("actor-b").await;
        assert_eq!(forwarded.len(), 1);
        let next: Envelope = serde_json::from_slice(&forwarded[0].body).unwrap();
        assert_eq!(next.route.actors, vec!["actor-a", "actor-b", "actor-c"]);
        assert_eq!(next.total_actors, 3);
    }

    #[tokio::test]
    async fn envelope_mode_rewrite_violating_prefix_routes_to_error_end() {
        let response = br#"{"payload":{"n":9},"route":{"actors":["actor-x","actor-b"],"current":0,"metadata":{}}}"#;
        let (_dir, sock) = spawn_handler(response).await;
        let transport = MockTransport::new();
        let envelope = sample_envelope(&["actor-a", "actor-b"]);
        transport.seed("actor-a", serde_json::to_vec(&envelope).unwrap()).await;

        let runtime = RuntimeClient::new(sock, std::time::Duration::from_secs(5));
        let pump = Pump::new(&test_config(), transport.clone(), runtime, ctx());

        let messages = transport.receive(&ctx(), "actor-a", 1).await.unwrap();
        pump.process_message(&messages[0]).await;

        let forwarded = transport.drain("error-end").await;
        assert_eq!(forwarded.len(), 1);
        let next: Envelope = serde_json::from_slice(&forwarded[0].body).unwrap();
        assert!(next.error.as_deref().unwrap().contains("processing_error") || next.headers.get("error_code").is_some());
    }

    #[tokio::test]
    async fn empty_response_publishes_original_to_happy_end_with_null_payload() {
        let (_dir, sock) = spawn_handler(b"null").await;
        let transport = MockTransport::new();
        let envelope = sample_envelope(&["actor-a", "actor-b"]);
        transport.seed("actor-a", serde_json::to_vec(&envelope).unwrap()).await;

        let runtime = RuntimeClient::new(sock, std::time::Duration::from_secs(5));
        let pump = Pump::new(&test_config(), transport.clone(), runtime, ctx());

        let messages = transport.receive(&ctx(), "actor-a", 1).await.unwrap();
        pump.process_message(&messages[0]).await;

        let forwarded = transport.drain("happy-end").await;
        assert_eq!(forwarded.len(), 1);
        let next: Envelope = serde_json::from_slice(&forwarded[0].body).unwrap();
        assert_eq!(next.payload, Value::Null);
    }
}
