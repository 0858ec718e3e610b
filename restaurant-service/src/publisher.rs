use anyhow::Result;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use shared::{NotificationJob, SEND_ROUTING_KEY};
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Best-effort producer of notification jobs.
///
/// By the time a job is published the workflow transaction has already
/// committed, so nothing here returns an error to the caller: failures are
/// logged and dropped.
#[derive(Clone)]
pub struct NotificationPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
    in_flight: TaskTracker,
}

impl NotificationPublisher {
    pub fn new(producer: FutureProducer, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            producer,
            topic: topic.into(),
            timeout,
            in_flight: TaskTracker::new(),
        }
    }

    /// Producer settings for durable notification delivery.
    pub fn client_config(brokers: &str, timeout: Duration) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", "all");
        config
    }

    /// Publishes and waits for the broker's answer. Returns whether the job
    /// was accepted; never fails.
    pub async fn publish(&self, routing_key: &str, job: &NotificationJob) -> bool {
        match self.try_publish(routing_key, job).await {
            Ok(()) => {
                info!(template = %job.template, routing_key, "Notification published");
                true
            }
            Err(e) => {
                warn!(
                    template = %job.template,
                    routing_key,
                    error = %e,
                    "Failed to publish notification, continuing without it"
                );
                false
            }
        }
    }

    /// Publishes in the background so the request path never waits on the
    /// broker. The task is tracked until [`NotificationPublisher::close`].
    pub fn dispatch(&self, job: NotificationJob) {
        let publisher = self.clone();
        self.in_flight.spawn(async move {
            publisher.publish(SEND_ROUTING_KEY, &job).await;
        });
    }

    /// Number of dispatched jobs whose publish has not finished yet.
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Waits for every dispatched job to be handed to the broker, then
    /// flushes in-flight messages before the process exits.
    pub async fn close(&self) {
        self.in_flight.close();
        self.in_flight.wait().await;

        if let Err(e) = self.producer.flush(self.timeout) {
            warn!(error = %e, "Notification producer did not flush cleanly");
        }
    }

    async fn try_publish(&self, routing_key: &str, job: &NotificationJob) -> Result<()> {
        let payload = serde_json::to_vec(job)?;
        let record = FutureRecord::to(&self.topic)
            .payload(&payload)
            .key(routing_key);

        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to publish notification: {}", e))?;

        Ok(())
    }
}
