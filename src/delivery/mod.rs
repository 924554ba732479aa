//! Client-side delivery of due reminders.
//!
//! A reminder may interrupt the user at most once per session and at most
//! [`DAILY_DISPLAY_CAP`] times per calendar day. The two limits live in
//! different places: session marks are dropped with the session, the daily
//! counts go to a [`DisplayLedger`] that outlives it.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

pub mod ledger;
pub mod poller;
pub mod source;

pub use ledger::{DisplayLedger, FileLedger, MemoryLedger};
pub use poller::{PollerConfig, ReminderPoller, ReminderPresenter};
pub use source::{HttpReminderSource, ReminderSource};

pub const DAILY_DISPLAY_CAP: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Already shown in this session.
    Session,
    /// Shown the maximum number of times today.
    DailyCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayDecision {
    Show,
    Suppress(SuppressReason),
}

pub struct DeliveryDeduplicator<L> {
    session: HashSet<Uuid>,
    ledger: L,
    daily_cap: u32,
}

impl<L: DisplayLedger> DeliveryDeduplicator<L> {
    pub fn new(ledger: L) -> Self {
        Self::with_cap(ledger, DAILY_DISPLAY_CAP)
    }

    pub fn with_cap(ledger: L, daily_cap: u32) -> Self {
        Self {
            session: HashSet::new(),
            ledger,
            daily_cap,
        }
    }

    /// Decides whether `reminder_id` should be shown now and records the
    /// display when it should. The session mark is set once the ledger has
    /// answered, whether the reminder is shown or capped; a ledger error leaves
    /// it unset so the next poll tries again.
    pub fn decide(&mut self, reminder_id: Uuid, today: NaiveDate) -> anyhow::Result<DisplayDecision> {
        if self.session.contains(&reminder_id) {
            return Ok(DisplayDecision::Suppress(SuppressReason::Session));
        }
        let shown = self.ledger.shown(reminder_id, today)?;
        if shown >= self.daily_cap {
            debug!(reminder_id = %reminder_id, shown, "daily display cap reached");
            self.session.insert(reminder_id);
            return Ok(DisplayDecision::Suppress(SuppressReason::DailyCap));
        }
        self.ledger.record(reminder_id, today)?;
        self.session.insert(reminder_id);
        Ok(DisplayDecision::Show)
    }

    pub fn seen_this_session(&self, reminder_id: Uuid) -> bool {
        self.session.contains(&reminder_id)
    }

    /// Forgets the session marks; daily counts are kept.
    pub fn end_session(&mut self) {
        self.session.clear();
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}
