//! NATS JetStream queue.
//!
//! A durable pull consumer with explicit acks. JetStream's own redelivery
//! limit sits one above the worker's so that the last delivery reaches the
//! worker, which then terminates it and republishes the body on the
//! dead-letter subject.

use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{self, consumer::pull, consumer::AckPolicy, AckKind};
use async_nats::HeaderMap;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use enrichment::QueueMessage;

use super::MessageQueue;

const DEAD_LETTER_REASON_HEADER: &str = "Dead-Letter-Reason";
const DEAD_LETTER_RECEIVES_HEADER: &str = "Dead-Letter-Receive-Count";
const MSG_ID_HEADER: &str = "Nats-Msg-Id";

#[derive(Debug, Clone)]
pub struct JetStreamSettings {
    pub stream_name: String,
    pub subject: String,
    pub consumer_name: String,
    pub dead_letter_subject: String,
    /// How long a delivered message stays hidden before JetStream redelivers it
    pub ack_wait: Duration,
    pub max_receive_count: u32,
}

struct InFlight {
    message: jetstream::Message,
    receive_count: u32,
}

/// [`MessageQueue`] over a JetStream pull consumer.
pub struct JetStreamQueue {
    context: jetstream::Context,
    consumer: jetstream::consumer::PullConsumer,
    dead_letter_subject: String,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl JetStreamQueue {
    /// Ensure the work and dead-letter streams and the durable consumer exist.
    pub async fn connect(client: async_nats::Client, settings: &JetStreamSettings) -> Result<Self> {
        let context = jetstream::new(client);

        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: settings.stream_name.clone(),
                subjects: vec![settings.subject.clone()],
                ..Default::default()
            })
            .await
            .with_context(|| format!("failed to open stream {}", settings.stream_name))?;

        let dead_letter_stream = format!("{}_DLQ", settings.stream_name);
        context
            .get_or_create_stream(jetstream::stream::Config {
                name: dead_letter_stream.clone(),
                subjects: vec![settings.dead_letter_subject.clone()],
                ..Default::default()
            })
            .await
            .with_context(|| format!("failed to open stream {}", dead_letter_stream))?;

        let consumer = stream
            .get_or_create_consumer(
                &settings.consumer_name,
                pull::Config {
                    durable_name: Some(settings.consumer_name.clone()),
                    filter_subject: settings.subject.clone(),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: settings.ack_wait,
                    max_deliver: i64::from(settings.max_receive_count) + 1,
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("failed to open consumer {}", settings.consumer_name))?;

        info!(
            stream = %settings.stream_name,
            consumer = %settings.consumer_name,
            dead_letter_subject = %settings.dead_letter_subject,
            "jetstream queue ready"
        );

        Ok(Self {
            context,
            consumer,
            dead_letter_subject: settings.dead_letter_subject.clone(),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    async fn take(&self, message_id: &str) -> Result<InFlight> {
        self.in_flight
            .lock()
            .await
            .remove(message_id)
            .ok_or_else(|| anyhow!("message {} is not in flight", message_id))
    }
}

#[async_trait]
impl MessageQueue for JetStreamQueue {
    async fn receive(&self, max_messages: usize, wait: Duration) -> Result<Vec<QueueMessage>> {
        let mut batch = self
            .consumer
            .batch()
            .max_messages(max_messages)
            .expires(wait)
            .messages()
            .await
            .context("failed to request batch")?;

        let mut received = Vec::new();
        let mut in_flight = self.in_flight.lock().await;
        while let Some(message) = batch.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "failed to receive message");
                    continue;
                }
            };
            let (id, receive_count) = match message.info() {
                Ok(info) => (
                    info.stream_sequence.to_string(),
                    u32::try_from(info.delivered).unwrap_or(u32::MAX),
                ),
                Err(e) => {
                    warn!(error = %e, "message has no delivery info, skipping");
                    continue;
                }
            };

            let mut queued = QueueMessage::new(id.clone(), message.payload.clone())
                .with_receive_count(receive_count);
            if let Some(msg_id) = message
                .headers
                .as_ref()
                .and_then(|headers| headers.get(MSG_ID_HEADER))
            {
                queued = queued.with_correlation_id(msg_id.as_str());
            }

            in_flight.insert(
                id,
                InFlight {
                    message,
                    receive_count,
                },
            );
            received.push(queued);
        }

        if !received.is_empty() {
            debug!(count = received.len(), "received messages");
        }
        Ok(received)
    }

    async fn acknowledge(&self, message_id: &str) -> Result<()> {
        let entry = self.take(message_id).await?;
        entry
            .message
            .ack()
            .await
            .map_err(|e| anyhow!("failed to ack message {}: {}", message_id, e))
    }

    async fn release(&self, message_id: &str) -> Result<()> {
        let entry = self.take(message_id).await?;
        entry
            .message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| anyhow!("failed to nak message {}: {}", message_id, e))
    }

    async fn dead_letter(&self, message_id: &str, reason: &str) -> Result<()> {
        let entry = self.take(message_id).await?;

        let mut headers = HeaderMap::new();
        headers.insert(DEAD_LETTER_REASON_HEADER, reason);
        headers.insert(
            DEAD_LETTER_RECEIVES_HEADER,
            entry.receive_count.to_string().as_str(),
        );

        let published = async {
            self.context
                .publish_with_headers(
                    self.dead_letter_subject.clone(),
                    headers,
                    entry.message.payload.clone(),
                )
                .await?
                .await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;

        if let Err(e) = published {
            // Leave it for one more delivery rather than lose it
            let _ = entry.message.ack_with(AckKind::Nak(None)).await;
            return Err(e.context(format!("failed to dead-letter message {}", message_id)));
        }

        entry
            .message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| anyhow!("failed to terminate message {}: {}", message_id, e))
    }
}
