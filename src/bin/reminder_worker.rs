use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use equiptrack::{
    clock::SystemClock,
    config::AppConfig,
    db,
    lifecycle::LifecycleEngine,
    notify::{LoggingChannel, NotificationChannel, WebhookChannel},
    store::PgStore,
    ReminderWorker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "reminder-worker",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        webhook_enabled = config.notification_webhook_url.is_some(),
        interval_secs = config.reminder_worker_interval().as_secs(),
        "loaded equiptrack configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;

    let channel: Arc<dyn NotificationChannel> = match config.notification_webhook_url.clone() {
        Some(url) => Arc::new(WebhookChannel::new(url)?),
        None => Arc::new(LoggingChannel),
    };
    let engine = Arc::new(LifecycleEngine::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(SystemClock),
        config.reminder_policy(),
    ));
    let worker = ReminderWorker::new(engine, channel, config.reminder_worker_interval());

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("reminder worker received shutdown signal");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
