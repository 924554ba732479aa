//! Background loop that checks for due reminders and presents the ones the
//! deduplicator lets through.
//!
//! One poller per signed-in session. Checks are spaced by the injected clock,
//! so interval ticks and nudges that arrive too early are skipped. Dropping the
//! poller aborts its task.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{DeliveryDeduplicator, DisplayDecision, DisplayLedger, ReminderSource};
use crate::clock::Clock;
use crate::domain::Reminder;

/// Shows a reminder to the user.
pub trait ReminderPresenter: Send + Sync {
    fn present(&self, reminder: &Reminder);
}

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Delay before the first check so start-up work settles first.
    pub initial_delay: Duration,
    pub interval: Duration,
    /// Minimum spacing between two checks, whatever triggered them.
    pub min_spacing: chrono::Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            interval: Duration::from_secs(60),
            min_spacing: chrono::Duration::seconds(30),
        }
    }
}

pub struct ReminderPoller {
    nudge: Arc<Notify>,
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

struct PollLoop<L> {
    config: PollerConfig,
    source: Arc<dyn ReminderSource>,
    presenter: Arc<dyn ReminderPresenter>,
    dedup: DeliveryDeduplicator<L>,
    clock: Arc<dyn Clock>,
    last_check: Option<NaiveDateTime>,
}

impl<L: DisplayLedger> PollLoop<L> {
    async fn check(&mut self) {
        let now = self.clock.now();
        if let Some(last) = self.last_check {
            if now - last < self.config.min_spacing {
                debug!("reminder check skipped; too soon after the previous one");
                return;
            }
        }
        self.last_check = Some(now);

        let reminders = match self.source.fetch_due().await {
            Ok(reminders) => reminders,
            Err(err) => {
                debug!(error = %err, "reminder check failed; retrying on next tick");
                return;
            }
        };

        let today = now.date();
        for reminder in &reminders {
            match self.dedup.decide(reminder.id, today) {
                Ok(DisplayDecision::Show) => self.presenter.present(reminder),
                Ok(DisplayDecision::Suppress(reason)) => {
                    debug!(reminder_id = %reminder.id, ?reason, "reminder suppressed");
                }
                Err(err) => {
                    warn!(reminder_id = %reminder.id, error = %err, "display ledger unavailable");
                }
            }
        }
    }
}

impl ReminderPoller {
    pub fn start<L>(
        config: PollerConfig,
        source: Arc<dyn ReminderSource>,
        presenter: Arc<dyn ReminderPresenter>,
        dedup: DeliveryDeduplicator<L>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        L: DisplayLedger + 'static,
    {
        let nudge = Arc::new(Notify::new());
        let (stop, mut stopped) = watch::channel(false);
        let mut poll = PollLoop {
            config,
            source,
            presenter,
            dedup,
            clock,
            last_check: None,
        };
        let wake = nudge.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = sleep(config.initial_delay) => {}
                _ = stopped.changed() => return,
            }
            loop {
                poll.check().await;
                tokio::select! {
                    _ = sleep(config.interval) => {}
                    _ = wake.notified() => {}
                    _ = stopped.changed() => break,
                }
            }
            debug!("reminder poller stopped");
        });

        Self {
            nudge,
            stop,
            handle: Some(handle),
        }
    }

    /// Requests an out-of-band check, e.g. when the user comes back to the app.
    /// The minimum spacing still applies.
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the loop and waits for its task to finish.
    pub async fn stop(mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "reminder poller task failed");
            }
        }
    }
}

impl Drop for ReminderPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::clock::ManualClock;
    use crate::delivery::MemoryLedger;
    use crate::domain::{ReminderKind, ReminderStatus};

    fn start_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn reminder() -> Reminder {
        Reminder {
            id: Uuid::new_v4(),
            kind: ReminderKind::CalibrationExpiry,
            owner_id: Uuid::new_v4(),
            related_request_id: Uuid::new_v4(),
            item_serial: "SN-100".to_string(),
            due_date: NaiveDate::from_ymd_opt(2025, 7, 10).unwrap(),
            fire_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            title: "Calibration expiring".to_string(),
            message: "soon".to_string(),
            status: ReminderStatus::Pending,
            email_sent: false,
            notified_at: None,
            created_at: start_time(),
        }
    }

    struct FixedSource {
        reminders: Vec<Reminder>,
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl ReminderSource for FixedSource {
        async fn fetch_due(&self) -> anyhow::Result<Vec<Reminder>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(anyhow!("network down"));
            }
            Ok(self.reminders.clone())
        }
    }

    #[derive(Default)]
    struct RecordingPresenter {
        shown: Mutex<Vec<Uuid>>,
    }

    impl ReminderPresenter for RecordingPresenter {
        fn present(&self, reminder: &Reminder) {
            self.shown.lock().unwrap().push(reminder.id);
        }
    }

    fn fast_config() -> PollerConfig {
        PollerConfig {
            initial_delay: Duration::from_millis(10),
            interval: Duration::from_millis(10),
            min_spacing: chrono::Duration::minutes(1),
        }
    }

    async fn wait_for_calls(source: &FixedSource, expected: usize) {
        for _ in 0..200 {
            if source.calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("source was called fewer than {expected} times");
    }

    #[tokio::test]
    async fn checks_are_spaced_by_the_clock() {
        let source = Arc::new(FixedSource {
            reminders: vec![reminder()],
            calls: AtomicUsize::new(0),
            fail_first: false,
        });
        let presenter = Arc::new(RecordingPresenter::default());
        let clock = Arc::new(ManualClock::new(start_time()));
        let poller = ReminderPoller::start(
            fast_config(),
            source.clone(),
            presenter.clone(),
            DeliveryDeduplicator::new(MemoryLedger::default()),
            clock.clone(),
        );

        wait_for_calls(&source, 1).await;
        sleep(Duration::from_millis(80)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        poller.nudge();
        sleep(Duration::from_millis(30)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::minutes(2));
        poller.nudge();
        wait_for_calls(&source, 2).await;

        assert_eq!(presenter.shown.lock().unwrap().len(), 1);
        poller.stop().await;
    }

    #[tokio::test]
    async fn failures_are_absorbed_and_retried() {
        let source = Arc::new(FixedSource {
            reminders: vec![reminder()],
            calls: AtomicUsize::new(0),
            fail_first: true,
        });
        let presenter = Arc::new(RecordingPresenter::default());
        let clock = Arc::new(ManualClock::new(start_time()));
        let poller = ReminderPoller::start(
            fast_config(),
            source.clone(),
            presenter.clone(),
            DeliveryDeduplicator::new(MemoryLedger::default()),
            clock.clone(),
        );

        wait_for_calls(&source, 1).await;
        assert!(presenter.shown.lock().unwrap().is_empty());
        assert!(poller.is_running());

        clock.advance(chrono::Duration::minutes(2));
        wait_for_calls(&source, 2).await;
        sleep(Duration::from_millis(20)).await;
        assert_eq!(presenter.shown.lock().unwrap().len(), 1);
        poller.stop().await;
    }

    #[tokio::test]
    async fn stopped_poller_never_checks_again() {
        let source = Arc::new(FixedSource {
            reminders: Vec::new(),
            calls: AtomicUsize::new(0),
            fail_first: false,
        });
        let clock = Arc::new(ManualClock::new(start_time()));
        let poller = ReminderPoller::start(
            PollerConfig {
                initial_delay: Duration::from_millis(50),
                ..fast_config()
            },
            source.clone(),
            Arc::new(RecordingPresenter::default()),
            DeliveryDeduplicator::new(MemoryLedger::default()),
            clock.clone(),
        );

        poller.stop().await;
        clock.advance(chrono::Duration::minutes(5));
        sleep(Duration::from_millis(100)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }
}
