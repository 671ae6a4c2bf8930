//! RabbitMQ-backed transport: broker push delivery, acked per message.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{acker::Acker, BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tokio::sync::{Mutex, RwLock};
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancellable;
use crate::error::TransportError;
use crate::message::Message;
use crate::receipt::join_receipt_handle;
use crate::transport::{Transport, TransportHealth};

pub struct RabbitMqTransport {
    channel: Channel,
    consumers: RwLock<HashMap<String, Arc<Mutex<Consumer>>>>,
    ackers: RwLock<HashMap<String, Acker>>,
    poll_wait: Duration,
}

impl RabbitMqTransport {
    pub async fn connect(amqp_url: &str, poll_wait_secs: u32) -> Result<Self, TransportError> {
        let conn = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| TransportError::Connection(format!("AMQP connect failed: {e}")))?;
        let channel = conn.create_channel().await.map_err(|e| TransportError::Connection(e.to_string()))?;
        info!("RabbitMQ transport connected");
        Ok(Self {
            channel,
            consumers: RwLock::new(HashMap::new()),
            ackers: RwLock::new(HashMap::new()),
            poll_wait: Duration::from_secs(poll_wait_secs.max(1) as u64),
        })
    }

    async fn ensure_queue(&self, queue: &str) -> Result<(), TransportError> {
        self.channel
            .queue_declare(queue, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
            .await
            .map_err(|e| TransportError::Provider(format!("queue_declare failed: {e}")))?;
        Ok(())
    }

    async fn consumer_for(&self, queue: &str) -> Result<Arc<Mutex<Consumer>>, TransportError> {
        if let Some(c) = self.consumers.read().await.get(queue) {
            return Ok(c.clone());
        }
        self.ensure_queue(queue).await?;
        let tag = format!("asya-{}", Uuid::new_v4());
        let consumer = self
            .channel
            .basic_consume(queue, &tag, BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(|e| TransportError::Connection(format!("basic_consume failed: {e}")))?;
        let wrapped = Arc::new(Mutex::new(consumer));
        self.consumers.write().await.insert(queue.to_string(), wrapped.clone());
        Ok(wrapped)
    }
}

#[async_trait]
impl Transport for RabbitMqTransport {
    async fn send(&self, ctx: &CancellationToken, queue: &str, body: Vec<u8>, headers: HashMap<String, String>) -> Result<(), TransportError> {
        cancellable(ctx, async {
            self.ensure_queue(queue).await?;
            let mut table = FieldTable::default();
            for (k, v) in headers {
                table.insert(k.into(), AMQPValue::LongString(v.into()));
            }
            let props = BasicProperties::default().with_headers(table);

            self.channel
                .basic_publish(
                    "", // default exchange: routing key == queue name
                    queue,
                    BasicPublishOptions::default(),
                    &body,
                    props,
                )
                .await
                .map_err(|e| TransportError::Provider(format!("basic_publish failed: {e}")))?
                .await
                .map_err(|e| TransportError::Provider(format!("publisher confirm failed: {e}")))?;

            Ok(())
        })
        .await
    }

    async fn receive(&self, ctx: &CancellationToken, queue: &str, max_messages: u32) -> Result<Vec<Message>, TransportError> {
        cancellable(ctx, async {
        let consumer = self.consumer_for(queue).await?;
        let mut stream = consumer.lock().await;
        let mut messages = Vec::new();

        while messages.len() < max_messages as usize {
            let next = timeout(self.poll_wait, stream.next()).await;
            let delivery = match next {
                Ok(Some(Ok(d))) => d,
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "RabbitMQ delivery error");
                    break;
                }
                Ok(None) => break,
                Err(_) => break, // poll window elapsed, return what we have
            };

            let mut headers: HashMap<String, String> = delivery
                .properties
                .headers()
                .as_ref()
                .map(|t| {
                    t.into_iter()
                        .filter_map(|(k, v)| match v {
                            AMQPValue::LongString(s) => Some((k.to_string(), s.to_string())),
                            AMQPValue::ShortString(s) => Some((k.to_string(), s.to_string())),
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default();
            headers.insert("QueueName".to_string(), queue.to_string());

            let receipt_handle = join_receipt_handle(queue, &delivery.delivery_tag.to_string());
            self.ackers.write().await.insert(receipt_handle.clone(), delivery.acker.clone());

            debug!(queue, tag = delivery.delivery_tag, "received AMQP delivery");

            messages.push(Message {
                id: Uuid::new_v4().to_string(),
                body: delivery.data,
                receipt_handle,
                headers,
                enqueued_at: Utc::now(),
                delivery_count: 1,
            });
        }

            Ok(messages)
        })
        .await
    }

    async fn ack(&self, ctx: &CancellationToken, message: &Message) -> Result<(), TransportError> {
        cancellable(ctx, async {
            let acker = self
                .ackers
                .write()
                .await
                .remove(&message.receipt_handle)
                .ok_or_else(|| TransportError::MalformedHandle(message.receipt_handle.clone()))?;
            acker
                .ack(BasicAckOptions::default())
                .await
                .map_err(|e| TransportError::Ack(format!("AMQP ack failed: {e}")))
        })
        .await
    }

    async fn nack(&self, ctx: &CancellationToken, message: &Message) -> Result<(), TransportError> {
        cancellable(ctx, async {
            let acker = self
                .ackers
                .write()
                .await
                .remove(&message.receipt_handle)
                .ok_or_else(|| TransportError::MalformedHandle(message.receipt_handle.clone()))?;
            acker
                .nack(BasicNackOptions { requeue: true, ..Default::default() })
                .await
                .map_err(|e| TransportError::Provider(format!("AMQP nack failed: {e}")))
        })
        .await
    }

    async fn health_check(&self, queue: &str) -> Result<TransportHealth, TransportError> {
        let decl = self
            .channel
            .queue_declare(
                queue,
                QueueDeclareOptions { durable: true, passive: true, ..Default::default() },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::Connection(format!("queue_declare (passive) failed: {e}")))?;

        Ok(TransportHealth {
            connected: true,
            approximate_message_count: Some(decl.message_count() as u64),
            provider: "rabbitmq".to_string(),
        })
    }
}
