//! Message delivery to chat recipients.
//!
//! The scheduler depends only on the [`MessageSender`] trait; any chat
//! platform plugs in behind it. The shipped implementation posts the
//! caption and image to a webhook endpoint as JSON.

use crate::config::DeliveryConfig;
use crate::content::CalendarContent;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use std::time::Duration;

/// Delivers rendered content to a recipient.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send `content` to the recipient, or [`BotError::Delivery`].
    async fn send(&self, recipient_id: &str, content: &CalendarContent) -> Result<()>;
}

/// Webhook-based sender: POSTs `{recipient, text, image, image_format}`.
pub struct WebhookSender {
    client: reqwest::Client,
    url: String,
    bearer_token: Option<String>,
}

impl WebhookSender {
    /// Build a sender from the delivery section of the config.
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        if config.webhook_url.trim().is_empty() {
            return Err(BotError::Config("delivery webhook_url is empty".to_owned()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BotError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: config.webhook_url.clone(),
            bearer_token: config.bearer_token.clone(),
        })
    }
}

#[async_trait]
impl MessageSender for WebhookSender {
    async fn send(&self, recipient_id: &str, content: &CalendarContent) -> Result<()> {
        let body = json!({
            "recipient": recipient_id,
            "text": content.text,
            "image": base64::engine::general_purpose::STANDARD.encode(&content.image),
            "image_format": content.image_format,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.bearer_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| BotError::Delivery(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Delivery(format!(
                "webhook send failed ({status}): {body}"
            )));
        }
        Ok(())
    }
}
