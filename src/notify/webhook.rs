use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use super::{NotificationChannel, OutboundMessage};

/// Posts each message as JSON to a relay that owns the actual transport.
pub struct WebhookChannel {
    client: Client,
    url: Url,
}

impl WebhookChannel {
    pub fn new(url: Url) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        let payload = json!({
            "reminder_id": message.reminder_id,
            "recipient_id": message.recipient_id,
            "recipient": message.recipient,
            "subject": message.subject,
            "body": message.body,
        });

        let response = self
            .client
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .context("webhook request failed")?;

        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        warn!(reminder_id = %message.reminder_id, %status, %body, "webhook rejected message");
        Err(anyhow!("webhook responded with status {status}"))
    }
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingChannel;

#[async_trait]
impl NotificationChannel for LoggingChannel {
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        info!(
            reminder_id = %message.reminder_id,
            recipient = %message.recipient,
            subject = %message.subject,
            "outbound notification"
        );
        Ok(())
    }
}
