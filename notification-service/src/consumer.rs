use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use shared::{binding_matches, DEAD_LETTER_REASON_HEADER, SEND_ROUTING_KEY};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::delivery::{Dispatcher, Outcome, RetryPolicy};

/// Floor for the pause between dead-letter forward attempts, whatever the
/// configured retry delay.
pub const MIN_FORWARD_BACKOFF: Duration = Duration::from_millis(100);

/// What a worker did with one message. Every disposition ends with the
/// offset being committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    /// Routing key outside this worker's binding.
    Skipped,
    DeadLettered,
    /// Failed in the dead-letter tier; there is no further tier.
    Dropped,
}

/// Destination for rejected jobs.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn forward(&self, key: &str, payload: &[u8], reason: &str) -> Result<()>;
}

pub struct KafkaDeadLetterSink {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaDeadLetterSink {
    pub fn new(producer: FutureProducer, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            producer,
            topic: topic.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetterSink {
    async fn forward(&self, key: &str, payload: &[u8], reason: &str) -> Result<()> {
        let headers = OwnedHeaders::new().insert(Header {
            key: DEAD_LETTER_REASON_HEADER,
            value: Some(reason),
        });
        let record = FutureRecord::to(&self.topic)
            .payload(payload)
            .key(key)
            .headers(headers);

        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to dead-letter notification: {}", e))?;

        Ok(())
    }
}

/// Consumer settings for manual, synchronous offset commits.
pub fn consumer_config(brokers: &str, group_id: &str) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("group.id", group_id)
        .set("bootstrap.servers", brokers)
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000")
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest");
    config
}

/// Producer settings for durable dead-letter forwarding.
pub fn producer_config(brokers: &str, timeout: Duration) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", timeout.as_millis().to_string())
        .set("acks", "all");
    config
}

fn message_key<'a>(message: &'a BorrowedMessage<'_>) -> Option<&'a str> {
    message.key().and_then(|key| std::str::from_utf8(key).ok())
}

fn header_value<'a>(message: &'a BorrowedMessage<'_>, name: &str) -> Option<&'a str> {
    message
        .headers()?
        .iter()
        .find(|header| header.key == name)?
        .value
        .and_then(|value| std::str::from_utf8(value).ok())
}

fn commit(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    if let Err(e) = consumer.commit_message(message, CommitMode::Sync) {
        error!("Error committing message: {}", e);
    }
}

/// Worker on the primary topic. Retries transport failures in process and
/// hands everything it cannot deliver to the dead-letter sink.
pub struct PrimaryWorker {
    dispatcher: Arc<Dispatcher>,
    dead_letters: Arc<dyn DeadLetterSink>,
    policy: RetryPolicy,
    binding: String,
}

impl PrimaryWorker {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        dead_letters: Arc<dyn DeadLetterSink>,
        policy: RetryPolicy,
        binding: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            dead_letters,
            policy,
            binding: binding.into(),
        }
    }

    pub async fn handle(&self, key: Option<&str>, payload: &[u8]) -> Disposition {
        let key = key.unwrap_or_default();
        if !binding_matches(&self.binding, key) {
            debug!(routing_key = key, binding = %self.binding, "Skipping unbound message");
            return Disposition::Skipped;
        }

        match self.dispatcher.attempt(payload, &self.policy).await {
            Outcome::Delivered { .. } => Disposition::Acked,
            Outcome::Failed {
                error,
                attempts,
                job,
            } => {
                let reason = error.to_string();
                let forwarded = job
                    .as_ref()
                    .and_then(|job| serde_json::to_vec(job).ok())
                    .unwrap_or_else(|| payload.to_vec());
                warn!(
                    routing_key = key,
                    attempts,
                    reason = %reason,
                    "Dead-lettering notification"
                );
                self.forward_until_accepted(key, &forwarded, &reason).await;
                Disposition::DeadLettered
            }
        }
    }

    /// The offset is only committed once the dead-letter copy exists, so a
    /// broker outage here stalls this worker instead of losing the job.
    async fn forward_until_accepted(&self, key: &str, payload: &[u8], reason: &str) {
        let key = if key.is_empty() { SEND_ROUTING_KEY } else { key };
        let backoff = self.policy.delay.max(MIN_FORWARD_BACKOFF);
        while let Err(e) = self.dead_letters.forward(key, payload, reason).await {
            error!(error = %e, "Dead-letter forward failed, retrying");
            tokio::time::sleep(backoff).await;
        }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();
        info!(binding = %self.binding, "Notification worker started");

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    let disposition = self
                        .handle(message_key(&m), m.payload().unwrap_or_default())
                        .await;
                    debug!(offset = m.offset(), ?disposition, "Message handled");
                    commit(&consumer, &m);
                }
                Err(e) => error!("Error receiving message: {}", e),
            }
        }
    }
}

/// Worker on the dead-letter topic: one more attempt, then the job is gone.
pub struct DeadLetterWorker {
    dispatcher: Arc<Dispatcher>,
    policy: RetryPolicy,
}

impl DeadLetterWorker {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            policy: RetryPolicy::single(),
        }
    }

    pub async fn handle(&self, payload: &[u8], reason: Option<&str>) -> Disposition {
        match self.dispatcher.attempt(payload, &self.policy).await {
            Outcome::Delivered { .. } => {
                info!(reason = reason.unwrap_or("unknown"), "Dead-lettered notification recovered");
                Disposition::Acked
            }
            Outcome::Failed {
                error,
                attempts,
                job,
            } => {
                error!(
                    template = job.as_ref().map(|job| job.template.as_str()).unwrap_or("unparsed"),
                    total_attempts = job.as_ref().map(|job| job.attempt).unwrap_or(attempts),
                    first_reason = reason.unwrap_or("unknown"),
                    error = %error,
                    "Dropping notification permanently"
                );
                Disposition::Dropped
            }
        }
    }

    pub async fn run(&self, consumer: StreamConsumer) {
        let mut message_stream = consumer.stream();
        info!("Dead-letter worker started");

        while let Some(message) = message_stream.next().await {
            match message {
                Ok(m) => {
                    let disposition = self
                        .handle(
                            m.payload().unwrap_or_default(),
                            header_value(&m, DEAD_LETTER_REASON_HEADER),
                        )
                        .await;
                    debug!(offset = m.offset(), ?disposition, "Dead letter handled");
                    commit(&consumer, &m);
                }
                Err(e) => error!("Error receiving dead letter: {}", e),
            }
        }
    }
}
