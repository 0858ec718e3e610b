use shared::{NotificationJob, NotificationStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::channel::{Channel, ChannelRegistry};
use crate::document;
use crate::error::DeliveryError;
use crate::templates::{Rendered, TemplateRegistry};

/// Bounded, fixed-delay retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// One attempt, no waiting. Used by the dead-letter tier.
    pub fn single() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

#[derive(Debug)]
pub enum Outcome {
    Delivered {
        attempts: u32,
    },
    /// `job` is `None` when the payload never parsed.
    Failed {
        error: DeliveryError,
        attempts: u32,
        job: Option<NotificationJob>,
    },
}

/// Renders and delivers notification jobs. Shared by both consumer tiers;
/// the tiers differ only in the retry policy they pass and what they do with
/// a failure.
pub struct Dispatcher {
    channels: ChannelRegistry,
    templates: TemplateRegistry,
    audit: Arc<dyn AuditLog>,
}

impl Dispatcher {
    pub fn new(channels: ChannelRegistry, templates: TemplateRegistry, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            channels,
            templates,
            audit,
        }
    }

    pub async fn attempt(&self, payload: &[u8], policy: &RetryPolicy) -> Outcome {
        let job = match NotificationJob::from_slice(payload) {
            Ok(job) => job,
            Err(e) => {
                return Outcome::Failed {
                    error: e.into(),
                    attempts: 0,
                    job: None,
                }
            }
        };
        self.deliver(job, policy).await
    }

    /// Processing errors (no recipients, unknown template or medium) fail
    /// before any attempt is made; transport errors are retried per `policy`.
    pub async fn deliver(&self, mut job: NotificationJob, policy: &RetryPolicy) -> Outcome {
        let (rendered, channel) = match self.prepare(&job) {
            Ok(prepared) => prepared,
            Err(error) => {
                return Outcome::Failed {
                    error,
                    attempts: 0,
                    job: Some(job),
                }
            }
        };
        let attachment = job
            .attachment_required
            .then(|| document::generate(&job, &rendered));
        let audit_id = self.audit_pending(&job).await;

        let mut attempts = 0;
        let error = loop {
            attempts += 1;
            match channel
                .send(&job.recipients, &rendered, attachment.as_ref())
                .await
            {
                Ok(()) => {
                    self.audit_outcome(audit_id, NotificationStatus::Sent, attempts, None)
                        .await;
                    info!(template = %job.template, attempts, "Notification delivered");
                    return Outcome::Delivered { attempts };
                }
                Err(e) if e.is_retryable() && attempts < policy.max_attempts => {
                    warn!(
                        template = %job.template,
                        attempt = attempts,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => break e,
            }
        };

        self.audit_outcome(
            audit_id,
            NotificationStatus::Failed,
            attempts,
            Some(error.to_string()),
        )
        .await;
        job.attempt += attempts;
        Outcome::Failed {
            error,
            attempts,
            job: Some(job),
        }
    }

    fn prepare(&self, job: &NotificationJob) -> Result<(Rendered, Arc<dyn Channel>), DeliveryError> {
        if job.recipients.iter().all(|r| r.trim().is_empty()) {
            return Err(DeliveryError::NoRecipients);
        }
        let rendered = self.templates.render(&job.template, &job.variables)?;
        let channel = self.channels.resolve(job.medium)?;
        Ok((rendered, channel))
    }

    async fn audit_pending(&self, job: &NotificationJob) -> Option<Uuid> {
        match self.audit.record_pending(job).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(template = %job.template, error = %e, "Could not write notification audit record");
                None
            }
        }
    }

    async fn audit_outcome(
        &self,
        id: Option<Uuid>,
        status: NotificationStatus,
        attempts: u32,
        last_error: Option<String>,
    ) {
        let Some(id) = id else { return };
        if let Err(e) = self
            .audit
            .record_outcome(id, status, attempts, last_error)
            .await
        {
            warn!(record_id = %id, error = %e, "Could not update notification audit record");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use shared::templates;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    fn confirmation() -> NotificationJob {
        NotificationJob::new(templates::RESERVATION_CONFIRMATION, "guest@example.com")
            .with_var("guest_name", "Ada")
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let channel = FlakyChannel::new(2);
        let audit = Arc::new(MemoryAudit::default());
        let dispatcher = dispatcher(channel.clone(), audit.clone());

        let outcome = dispatcher.attempt(&payload(&confirmation()), &policy(3)).await;

        assert!(matches!(outcome, Outcome::Delivered { attempts: 3 }));
        assert_eq!(channel.calls(), 3);
        let outcomes = audit.outcomes.lock().unwrap();
        assert_eq!(outcomes.as_slice(), &[(NotificationStatus::Sent, 3, None)]);
    }

    #[tokio::test]
    async fn gives_up_after_exactly_max_attempts() {
        let channel = FlakyChannel::new(u32::MAX);
        let audit = Arc::new(MemoryAudit::default());
        let dispatcher = dispatcher(channel.clone(), audit.clone());

        let outcome = dispatcher.attempt(&payload(&confirmation()), &policy(3)).await;

        match outcome {
            Outcome::Failed {
                error,
                attempts,
                job: Some(job),
            } => {
                assert!(error.is_retryable());
                assert_eq!(attempts, 3);
                assert_eq!(job.attempt, 3);
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(channel.calls(), 3);
        let outcomes = audit.outcomes.lock().unwrap();
        assert_eq!(outcomes[0].0, NotificationStatus::Failed);
        assert_eq!(outcomes[0].2.as_deref(), Some("transport failure: throttled #3"));
    }

    #[tokio::test]
    async fn waits_between_attempts() {
        let channel = FlakyChannel::new(1);
        let dispatcher = dispatcher(channel.clone(), Arc::new(MemoryAudit::default()));
        let started = std::time::Instant::now();

        let outcome = dispatcher
            .attempt(
                &payload(&confirmation()),
                &RetryPolicy::new(2, Duration::from_millis(50)),
            )
            .await;

        assert!(matches!(outcome, Outcome::Delivered { attempts: 2 }));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn malformed_payload_is_not_attempted() {
        let channel = FlakyChannel::new(0);
        let audit = Arc::new(MemoryAudit::default());
        let dispatcher = dispatcher(channel.clone(), audit.clone());

        let outcome = dispatcher.attempt(b"{not json", &policy(3)).await;

        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: DeliveryError::Malformed(_),
                attempts: 0,
                job: None
            }
        ));
        assert_eq!(channel.calls(), 0);
        assert_eq!(audit.pending.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_template_and_empty_recipients_fail_fast() {
        let channel = FlakyChannel::new(0);
        let dispatcher = dispatcher(channel.clone(), Arc::new(MemoryAudit::default()));

        let unknown = NotificationJob::new("newsletter", "guest@example.com");
        let outcome = dispatcher.deliver(unknown, &policy(3)).await;
        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: DeliveryError::UnknownTemplate(_),
                attempts: 0,
                ..
            }
        ));

        let mut nobody = confirmation();
        nobody.recipients.clear();
        let outcome = dispatcher.deliver(nobody, &policy(3)).await;
        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: DeliveryError::NoRecipients,
                ..
            }
        ));
        assert_eq!(channel.calls(), 0);
    }

    #[tokio::test]
    async fn audit_failures_do_not_block_delivery() {
        let channel = FlakyChannel::new(0);
        let dispatcher = dispatcher(channel.clone(), Arc::new(BrokenAudit));

        let outcome = dispatcher.attempt(&payload(&confirmation()), &policy(3)).await;

        assert!(matches!(outcome, Outcome::Delivered { attempts: 1 }));
        assert_eq!(channel.calls(), 1);
    }

    #[tokio::test]
    async fn attachment_is_generated_on_request() {
        let channel = FlakyChannel::new(0);
        let dispatcher = dispatcher(channel.clone(), Arc::new(MemoryAudit::default()));
        let job = NotificationJob::new(templates::PAYMENT_RECEIPT, "guest@example.com")
            .with_var("amount", "33.00")
            .with_var("reference", "p-1")
            .with_attachment();

        dispatcher.deliver(job, &policy(1)).await;

        let attachments = channel.attachments.lock().unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename, "payment_receipt-p-1.txt");
    }

    #[tokio::test]
    async fn prior_attempts_accumulate() {
        let channel = FlakyChannel::new(u32::MAX);
        let dispatcher = dispatcher(channel, Arc::new(MemoryAudit::default()));
        let mut job = confirmation();
        job.attempt = 3;

        let outcome = dispatcher.deliver(job, &RetryPolicy::single()).await;

        assert!(matches!(
            outcome,
            Outcome::Failed { attempts: 1, job: Some(ref job), .. } if job.attempt == 4
        ));
    }
}
