use async_trait::async_trait;
use aws_sdk_sesv2::error::DisplayErrorContext;
use aws_sdk_sesv2::primitives::Blob;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message, RawMessage};
use aws_sdk_sesv2::Client as SesClient;
use shared::Medium;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::document::Attachment;
use crate::error::DeliveryError;
use crate::mime;
use crate::templates::Rendered;

/// A way of reaching a recipient. One delivery attempt per call.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn send(
        &self,
        recipients: &[String],
        message: &Rendered,
        attachment: Option<&Attachment>,
    ) -> Result<(), DeliveryError>;
}

/// Channels keyed by medium.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: HashMap<Medium, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, medium: Medium, channel: Arc<dyn Channel>) -> Self {
        self.channels.insert(medium, channel);
        self
    }

    pub fn resolve(&self, medium: Medium) -> Result<Arc<dyn Channel>, DeliveryError> {
        self.channels
            .get(&medium)
            .cloned()
            .ok_or(DeliveryError::UnknownMedium(medium.as_str()))
    }
}

/// Email through Amazon SES. Messages without an attachment go out as
/// simple content; attachments need a raw MIME message.
pub struct SesEmailChannel {
    client: SesClient,
    from: String,
}

impl SesEmailChannel {
    pub fn new(client: SesClient, from: impl Into<String>) -> Self {
        Self {
            client,
            from: from.into(),
        }
    }

    /// Loads credentials from the default AWS provider chain. `region`
    /// overrides the ambient region for SES only.
    pub async fn from_env(from: impl Into<String>, region: Option<String>) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = match region {
            Some(region) => {
                let ses_config = aws_config
                    .to_builder()
                    .region(aws_config::Region::new(region))
                    .build();
                SesClient::new(&ses_config)
            }
            None => SesClient::new(&aws_config),
        };
        Self::new(client, from)
    }

    fn simple_content(message: &Rendered) -> Result<EmailContent, DeliveryError> {
        let subject = Content::builder()
            .data(&message.subject)
            .charset("UTF-8")
            .build()
            .map_err(|e| DeliveryError::Build(e.to_string()))?;
        let text = Content::builder()
            .data(&message.text)
            .charset("UTF-8")
            .build()
            .map_err(|e| DeliveryError::Build(e.to_string()))?;
        let html = Content::builder()
            .data(&message.html)
            .charset("UTF-8")
            .build()
            .map_err(|e| DeliveryError::Build(e.to_string()))?;

        let body = Body::builder().text(text).html(html).build();
        let message = Message::builder().subject(subject).body(body).build();
        Ok(EmailContent::builder().simple(message).build())
    }

    fn raw_content(
        &self,
        recipients: &[String],
        message: &Rendered,
        attachment: &Attachment,
    ) -> Result<EmailContent, DeliveryError> {
        let raw = mime::build_mixed(&self.from, recipients, message, attachment, Uuid::new_v4());
        let raw = RawMessage::builder()
            .data(Blob::new(raw))
            .build()
            .map_err(|e| DeliveryError::Build(e.to_string()))?;
        Ok(EmailContent::builder().raw(raw).build())
    }
}

#[async_trait]
impl Channel for SesEmailChannel {
    async fn send(
        &self,
        recipients: &[String],
        message: &Rendered,
        attachment: Option<&Attachment>,
    ) -> Result<(), DeliveryError> {
        let content = match attachment {
            Some(attachment) => self.raw_content(recipients, message, attachment)?,
            None => Self::simple_content(message)?,
        };

        self.client
            .send_email()
            .from_email_address(&self.from)
            .destination(
                Destination::builder()
                    .set_to_addresses(Some(recipients.to_vec()))
                    .build(),
            )
            .content(content)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(DisplayErrorContext(&e).to_string()))?;

        info!(
            recipients = recipients.len(),
            subject = %message.subject,
            attachment = attachment.is_some(),
            "Email sent"
        );
        Ok(())
    }
}
