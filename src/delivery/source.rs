use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::domain::Reminder;

/// Where the poller gets the signed-in user's due reminders from.
#[async_trait]
pub trait ReminderSource: Send + Sync {
    async fn fetch_due(&self) -> anyhow::Result<Vec<Reminder>>;
}

/// Reads `GET /api/reminders/due` with a bearer token.
pub struct HttpReminderSource {
    client: Client,
    endpoint: Url,
    token: String,
}

impl HttpReminderSource {
    pub fn new(base_url: &Url, token: impl Into<String>) -> anyhow::Result<Self> {
        let endpoint = base_url
            .join("/api/reminders/due")
            .context("invalid reminder endpoint")?;
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build reminder client")?;
        Ok(Self {
            client,
            endpoint,
            token: token.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ReminderSource for HttpReminderSource {
    async fn fetch_due(&self) -> anyhow::Result<Vec<Reminder>> {
        let reminders = self
            .client
            .get(self.endpoint.clone())
            .bearer_auth(&self.token)
            .send()
            .await
            .context("reminder request failed")?
            .error_for_status()
            .context("reminder endpoint returned an error")?
            .json::<Vec<Reminder>>()
            .await
            .context("invalid reminder payload")?;
        Ok(reminders)
    }
}
