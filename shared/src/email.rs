use async_trait::async_trait;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;
use thiserror::Error;

use crate::types::EmailMessage;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("failed to send email: {0}")]
    Delivery(String),
}

/// Delivers a composed message. Failure says nothing about why.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

/// Sends plain text mail through AWS SES
pub struct SesSender {
    client: SesClient,
    from_address: String,
}

impl SesSender {
    pub fn new(client: SesClient, from_address: impl Into<String>) -> Self {
        Self {
            client,
            from_address: from_address.into(),
        }
    }
}

fn utf8_content(data: &str, what: &str) -> Result<Content, NotifyError> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| NotifyError::Build(format!("{}: {:?}", what, e)))
}

#[async_trait]
impl NotificationSender for SesSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let destination = Destination::builder().to_addresses(&message.to).build();

        let subject = utf8_content(&message.subject, "subject")?;
        let text = utf8_content(&message.body, "text body")?;

        let body = Body::builder().text(text).build();
        let content = EmailContent::builder()
            .simple(Message::builder().subject(subject).body(body).build())
            .build();

        self.client
            .send_email()
            .from_email_address(&self.from_address)
            .destination(destination)
            .content(content)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("{:?}", e)))?;

        tracing::info!("Invitation email sent to {}", message.to);
        Ok(())
    }
}
