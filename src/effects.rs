//! Best-effort side effects that run after the primary transaction commits.
//!
//! Each effect gets its own transaction. A failure is logged and recorded in
//! the [`FailureLog`]; it never rolls back or fails the operation that queued it.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{ActivityEntry, NotificationSource, Role};
use crate::error::CoreResult;
use crate::notify;
use crate::store::{run_in_transaction, Store, Tx};

const FAILURE_LOG_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Activity(ActivityEntry),
    /// Inbox entry for every user holding `role`, except `exclude`.
    Broadcast {
        role: Role,
        exclude: Option<Uuid>,
        title: String,
        message: String,
        request_id: Option<Uuid>,
    },
}

impl Effect {
    fn label(&self) -> String {
        match self {
            Effect::Activity(entry) => format!("activity {} on {}", entry.action, entry.entity),
            Effect::Broadcast { role, .. } => format!("broadcast to {role}"),
        }
    }

    fn run(&self, tx: &mut dyn Tx, now: NaiveDateTime) -> CoreResult<()> {
        match self {
            Effect::Activity(entry) => tx.insert_activity(entry),
            Effect::Broadcast {
                role,
                exclude,
                title,
                message,
                request_id,
            } => {
                for recipient in tx.user_ids_with_role(*role)? {
                    if Some(recipient) == *exclude {
                        continue;
                    }
                    let notification = notify::notification(
                        recipient,
                        title,
                        message,
                        NotificationSource::Broadcast,
                        *request_id,
                        None,
                        now,
                    );
                    tx.insert_notification(&notification)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectFailure {
    pub effect: String,
    pub error: String,
    pub at: NaiveDateTime,
}

/// Bounded record of failed side effects, newest last.
#[derive(Debug, Default)]
pub struct FailureLog {
    entries: Mutex<VecDeque<EffectFailure>>,
}

impl FailureLog {
    pub fn record(&self, failure: EffectFailure) {
        let mut guard = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.len() == FAILURE_LOG_CAPACITY {
            guard.pop_front();
        }
        guard.push_back(failure);
    }

    pub fn recent(&self) -> Vec<EffectFailure> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct EffectQueue {
    effects: Vec<Effect>,
}

impl EffectQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn extend(&mut self, effects: impl IntoIterator<Item = Effect>) {
        self.effects.extend(effects);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Runs every queued effect and returns the ones that failed.
    pub fn flush(self, store: &dyn Store, log: &FailureLog, now: NaiveDateTime) -> Vec<EffectFailure> {
        let mut failures = Vec::new();
        for effect in self.effects {
            if let Err(err) = run_in_transaction(store, |tx| effect.run(tx, now)) {
                let failure = EffectFailure {
                    effect: effect.label(),
                    error: err.to_string(),
                    at: now,
                };
                warn!(effect = %failure.effect, error = %failure.error, "side effect failed");
                log.record(failure.clone());
                failures.push(failure);
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::audit;
    use crate::store::MemoryStore;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn failed_effects_are_recorded_not_raised() {
        let store = MemoryStore::new();
        store.fail_on("insert_activity");
        let log = FailureLog::default();
        let actor = Uuid::new_v4();

        let mut queue = EffectQueue::new();
        queue.push(Effect::Activity(audit::activity(
            actor,
            "request.approved",
            "calibration",
            "C1",
            json!({}),
            now(),
        )));
        queue.push(Effect::Broadcast {
            role: Role::Admin,
            exclude: None,
            title: "t".to_string(),
            message: "m".to_string(),
            request_id: None,
        });

        let failures = queue.flush(&store, &log, now());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].effect, "activity request.approved on calibration");
        assert_eq!(log.recent(), failures);
    }
}
