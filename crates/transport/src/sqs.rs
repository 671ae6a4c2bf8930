//! SQS-backed transport: long-poll plus visibility-timeout semantics.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::types::QueueAttributeName;
use aws_sdk_sqs::Client;
use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use asya_core::config::{AwsConfig, TransportConfig};

use crate::cancellable;
use crate::error::TransportError;
use crate::message::Message;
use crate::receipt::{join_receipt_handle, split_receipt_handle};
use crate::transport::{Transport, TransportHealth};

/// Resolves queue names to SQS queue URLs and caches the result, since
/// `GetQueueUrl` is one extra round trip we don't want to pay per message.
#[derive(Default)]
struct QueueUrlCache {
    urls: RwLock<HashMap<String, String>>,
}

impl QueueUrlCache {
    async fn resolve(&self, client: &Client, queue: &str) -> Result<String, TransportError> {
        if let Some(url) = self.urls.read().await.get(queue) {
            return Ok(url.clone());
        }
        let resp = client
            .get_queue_url()
            .queue_name(queue)
            .send()
            .await
            .map_err(|e| TransportError::NotFound(format!("queue '{queue}': {e:?}")))?;
        let url = resp
            .queue_url()
            .ok_or_else(|| TransportError::NotFound(queue.to_string()))?
            .to_string();
        self.urls.write().await.insert(queue.to_string(), url.clone());
        Ok(url)
    }
}

pub struct SqsTransport {
    client: Client,
    cache: Arc<QueueUrlCache>,
    visibility_timeout_secs: i32,
    poll_wait_secs: i32,
}

impl SqsTransport {
    pub async fn new(transport: &TransportConfig) -> Result<Self, TransportError> {
        let aws: &AwsConfig = &transport.aws;
        let region = aws_sdk_sqs::config::Region::new(aws.region.clone());

        // Built directly from config rather than `aws_config::load()`, which
        // also reads AWS_ENDPOINT_URL and would happily route SQS traffic to
        // an S3-shaped endpoint if one happened to be set for another service.
        let mut sqs_config = aws_sdk_sqs::Config::builder()
            .region(region)
            .behavior_version(BehaviorVersion::latest());

        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            let creds = Credentials::new(key_id, secret, aws.session_token.clone(), None, "asya-transport-static");
            sqs_config = sqs_config.credentials_provider(creds);
        }

        if let Some(ref endpoint) = aws.endpoint_url {
            if !endpoint.is_empty() {
                let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    endpoint.clone()
                } else {
                    format!("https://{endpoint}")
                };
                sqs_config = sqs_config.endpoint_url(&url);
            }
        }

        let client = Client::from_conf(sqs_config.build());
        info!(region = %aws.region, "SQS transport initialized");

        Ok(Self {
            client,
            cache: Arc::new(QueueUrlCache::default()),
            visibility_timeout_secs: transport.visibility_timeout_secs as i32,
            poll_wait_secs: transport.poll_wait_secs.min(20) as i32,
        })
    }
}

#[async_trait]
impl Transport for SqsTransport {
    async fn send(&self, ctx: &CancellationToken, queue: &str, body: Vec<u8>, headers: HashMap<String, String>) -> Result<(), TransportError> {
        cancellable(ctx, async {
            let url = self.cache.resolve(&self.client, queue).await?;
            let body_str = String::from_utf8(body).map_err(|e| TransportError::Parse(e.to_string()))?;

            let mut req = self.client.send_message().queue_url(&url).message_body(body_str);
            for (k, v) in headers {
                req = req.message_attribute(
                    k,
                    aws_sdk_sqs::types::MessageAttributeValue::builder()
                        .data_type("String")
                        .string_value(v)
                        .build()
                        .map_err(|e| TransportError::Provider(e.to_string()))?,
                );
            }

            req.send().await.map_err(|e| TransportError::Provider(format!("SQS send failed: {e:?}")))?;
            Ok(())
        })
        .await
    }

    async fn receive(&self, ctx: &CancellationToken, queue: &str, max_messages: u32) -> Result<Vec<Message>, TransportError> {
        cancellable(ctx, async {
            let url = self.cache.resolve(&self.client, queue).await?;
            let capped = max_messages.min(10) as i32;

            debug!(queue, max_messages = capped, "polling SQS");

            let resp = self
                .client
                .receive_message()
                .queue_url(&url)
                .max_number_of_messages(capped)
                .wait_time_seconds(self.poll_wait_secs)
                .visibility_timeout(self.visibility_timeout_secs)
                .message_system_attribute_names(aws_sdk_sqs::types::MessageSystemAttributeName::All)
                .message_attribute_names("All")
                .send()
                .await
                .map_err(|e| TransportError::Connection(format!("SQS receive failed: {e:?}")))?;

            let sqs_messages = resp.messages.unwrap_or_default();
            let mut messages = Vec::with_capacity(sqs_messages.len());

            for msg in sqs_messages {
                let id = msg.message_id().unwrap_or("unknown").to_string();
                let body = msg.body().unwrap_or("").as_bytes().to_vec();
                let inner_handle = msg
                    .receipt_handle()
                    .ok_or_else(|| TransportError::Parse("missing receipt handle".into()))?;
                let receipt_handle = join_receipt_handle(queue, inner_handle);

                let mut headers: HashMap<String, String> = msg
                    .message_attributes()
                    .map(|attrs| {
                        attrs
                            .iter()
                            .filter_map(|(k, v)| v.string_value().map(|s| (k.clone(), s.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                headers.insert("QueueName".to_string(), queue.to_string());

                let delivery_count = msg
                    .attributes()
                    .and_then(|attrs| attrs.get(&aws_sdk_sqs::types::MessageSystemAttributeName::ApproximateReceiveCount))
                    .and_then(|c| c.parse::<u32>().ok())
                    .unwrap_or(1);

                messages.push(Message {
                    id,
                    body,
                    receipt_handle,
                    headers,
                    enqueued_at: Utc::now(),
                    delivery_count,
                });
            }

            Ok(messages)
        })
        .await
    }

    async fn ack(&self, ctx: &CancellationToken, message: &Message) -> Result<(), TransportError> {
        cancellable(ctx, async {
            let (queue, inner_handle) = split_receipt_handle(&message.receipt_handle)?;
            let url = self.cache.resolve(&self.client, queue).await?;
            self.client
                .delete_message()
                .queue_url(&url)
                .receipt_handle(inner_handle)
                .send()
                .await
                .map_err(|e| TransportError::Ack(format!("SQS delete failed: {e:?}")))?;
            Ok(())
        })
        .await
    }

    async fn nack(&self, ctx: &CancellationToken, message: &Message) -> Result<(), TransportError> {
        cancellable(ctx, async {
            let (queue, inner_handle) = split_receipt_handle(&message.receipt_handle)?;
            let url = self.cache.resolve(&self.client, queue).await?;
            self.client
                .change_message_visibility()
                .queue_url(&url)
                .receipt_handle(inner_handle)
                .visibility_timeout(0)
                .send()
                .await
                .map_err(|e| TransportError::Provider(format!("SQS visibility change failed: {e:?}")))?;
            Ok(())
        })
        .await
    }

    async fn health_check(&self, queue: &str) -> Result<TransportHealth, TransportError> {
        let url = self.cache.resolve(&self.client, queue).await?;
        let resp = self
            .client
            .get_queue_attributes()
            .queue_url(&url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| TransportError::Connection(format!("SQS health check failed: {e:?}")))?;

        let count = resp
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<u64>().ok());

        Ok(TransportHealth { connected: true, approximate_message_count: count, provider: "sqs".to_string() })
    }
}
