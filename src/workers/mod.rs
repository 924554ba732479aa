use std::{sync::Arc, time::Duration};

use tokio::task;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    error::{AppError, CoreResult},
    lifecycle::LifecycleEngine,
    notify::NotificationChannel,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub failed: usize,
}

/// Delivers due reminders over an outbound channel. Each reminder is sent
/// once; a failed send is retried on a later tick.
pub struct ReminderWorker {
    engine: Arc<LifecycleEngine>,
    channel: Arc<dyn NotificationChannel>,
    poll_interval: Duration,
}

impl ReminderWorker {
    pub fn new(
        engine: Arc<LifecycleEngine>,
        channel: Arc<dyn NotificationChannel>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            engine,
            channel,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        info!(interval_secs = self.poll_interval.as_secs(), "reminder worker started");
        loop {
            match self.tick().await {
                Ok(report) if report.sent > 0 || report.failed > 0 => {
                    info!(sent = report.sent, failed = report.failed, "reminder delivery tick");
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "reminder worker tick failed"),
            }
            sleep(self.poll_interval).await;
        }
    }

    pub async fn tick(&self) -> Result<TickReport, AppError> {
        let messages = self.blocking(|engine| engine.pending_outbound()).await?;
        let mut report = TickReport::default();

        for message in messages {
            if let Err(err) = self.channel.send(&message).await {
                warn!(
                    reminder_id = %message.reminder_id,
                    recipient = %message.recipient,
                    error = %err,
                    "reminder delivery failed; will retry"
                );
                report.failed += 1;
                continue;
            }
            let reminder_id = message.reminder_id;
            self.blocking(move |engine| engine.mark_email_sent(reminder_id))
                .await?;
            report.sent += 1;
        }

        Ok(report)
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, AppError>
    where
        F: FnOnce(&LifecycleEngine) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        task::spawn_blocking(move || work(&engine))
            .await
            .map_err(|err| AppError::internal(format!("reminder task failed: {err}")))?
            .map_err(AppError::from)
    }
}
