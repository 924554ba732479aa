//! Reminder scheduling. Reminders are created reactively when a transition
//! establishes a future deadline, at most one pending per (kind, request).

use chrono::{Days, NaiveDate, NaiveDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    Actor, Reminder, ReminderKind, ReminderStatus, RequestStatus, ServiceRequest, WorkflowKind,
};
use crate::error::{CoreError, CoreResult};
use crate::store::Tx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderPolicy {
    pub calibration_expiry_days: i64,
    pub rental_return_days: i64,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            calibration_expiry_days: 30,
            rental_return_days: 7,
        }
    }
}

/// Largest accepted reminder offset, in days.
pub const MAX_OFFSET_DAYS: i64 = 3650;

impl ReminderPolicy {
    pub fn offset_days(&self, kind: ReminderKind) -> i64 {
        match kind {
            ReminderKind::CalibrationExpiry => self.calibration_expiry_days,
            ReminderKind::RentalReturn => self.rental_return_days,
        }
    }

    /// Both offsets must lie in `1..=MAX_OFFSET_DAYS`.
    pub fn validate(&self) -> CoreResult<()> {
        for kind in ReminderKind::ALL {
            let days = self.offset_days(*kind);
            if !(1..=MAX_OFFSET_DAYS).contains(&days) {
                return Err(CoreError::validation(format!(
                    "{kind} reminder offset must be between 1 and {MAX_OFFSET_DAYS} days, got {days}"
                )));
            }
        }
        Ok(())
    }

    pub fn fire_date(&self, kind: ReminderKind, due_date: NaiveDate) -> CoreResult<NaiveDate> {
        let days = self.offset_days(kind);
        u64::try_from(days)
            .ok()
            .filter(|days| *days > 0)
            .and_then(|days| due_date.checked_sub_days(Days::new(days)))
            .ok_or_else(|| {
                CoreError::validation(format!(
                    "no {kind} reminder date {days} days before {due_date}"
                ))
            })
    }
}

/// Deadline established by the request's current state, if any.
pub fn deadline_for(request: &ServiceRequest) -> Option<(ReminderKind, NaiveDate)> {
    match (request.kind, request.status) {
        (WorkflowKind::Calibration, RequestStatus::Completed) => request
            .valid_until
            .map(|date| (ReminderKind::CalibrationExpiry, date)),
        (WorkflowKind::Rental, RequestStatus::Approved) => request
            .due_date
            .map(|date| (ReminderKind::RentalReturn, date)),
        _ => None,
    }
}

/// Reminder kind made obsolete by the request's current state.
pub fn obsoleted_by(request: &ServiceRequest) -> Option<ReminderKind> {
    match request.kind {
        WorkflowKind::Rental if request.status.is_terminal() => Some(ReminderKind::RentalReturn),
        _ => None,
    }
}

fn describe(kind: ReminderKind, request: &ServiceRequest, due_date: NaiveDate) -> (String, String) {
    match kind {
        ReminderKind::CalibrationExpiry => (
            format!("Calibration expiring for {}", request.item_serial),
            format!(
                "The calibration of item {} is valid until {due_date}. Schedule a new calibration before it lapses.",
                request.item_serial
            ),
        ),
        ReminderKind::RentalReturn => (
            format!("Rental due for {}", request.item_serial),
            format!(
                "Item {} must be returned by {due_date}.",
                request.item_serial
            ),
        ),
    }
}

/// Persists a reminder for `request`, or returns `None` when one is already pending.
pub fn schedule_reminder(
    tx: &mut dyn Tx,
    policy: &ReminderPolicy,
    kind: ReminderKind,
    due_date: NaiveDate,
    request: &ServiceRequest,
    now: NaiveDateTime,
) -> CoreResult<Option<Reminder>> {
    if tx.find_pending_reminder(kind, request.id)?.is_some() {
        debug!(request_id = %request.id, kind = %kind, "reminder already pending");
        return Ok(None);
    }

    let (title, message) = describe(kind, request, due_date);
    let reminder = Reminder {
        id: Uuid::new_v4(),
        kind,
        owner_id: request.owner_id,
        related_request_id: request.id,
        item_serial: request.item_serial.clone(),
        due_date,
        fire_date: policy.fire_date(kind, due_date)?,
        title,
        message,
        status: ReminderStatus::Pending,
        email_sent: false,
        notified_at: None,
        created_at: now,
    };
    tx.insert_reminder(&reminder)?;
    info!(
        reminder_id = %reminder.id,
        request_id = %request.id,
        kind = %kind,
        fire_date = %reminder.fire_date,
        "scheduled reminder"
    );
    Ok(Some(reminder))
}

/// Cancels the pending reminders of `request_id`, optionally only of one kind.
pub fn cancel_pending(
    tx: &mut dyn Tx,
    request_id: Uuid,
    kind: Option<ReminderKind>,
) -> CoreResult<usize> {
    let mut cancelled = 0;
    for mut reminder in tx.reminders_for_request(request_id)? {
        if reminder.status != ReminderStatus::Pending || kind.is_some_and(|k| k != reminder.kind) {
            continue;
        }
        reminder.status = ReminderStatus::Cancelled;
        tx.update_reminder(&reminder)?;
        cancelled += 1;
    }
    Ok(cancelled)
}

/// Owner (or an admin) acknowledges a reminder so it stops being delivered.
pub fn dismiss(tx: &mut dyn Tx, actor: &Actor, reminder_id: Uuid) -> CoreResult<Reminder> {
    let mut reminder = tx
        .find_reminder(reminder_id)?
        .ok_or_else(|| CoreError::not_found(format!("reminder {reminder_id}")))?;
    if reminder.owner_id != actor.id && !actor.is_admin() {
        return Err(CoreError::forbidden("only the owner can dismiss this reminder"));
    }
    if reminder.status != ReminderStatus::Pending {
        return Err(CoreError::validation(format!(
            "reminder is already {}",
            reminder.status
        )));
    }
    reminder.status = ReminderStatus::Dismissed;
    tx.update_reminder(&reminder)?;
    Ok(reminder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{run_in_transaction, MemoryStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn completed_calibration() -> ServiceRequest {
        let now = date(2025, 1, 10).and_hms_opt(10, 0, 0).unwrap();
        ServiceRequest {
            id: Uuid::new_v4(),
            kind: WorkflowKind::Calibration,
            status: RequestStatus::Completed,
            owner_id: Uuid::new_v4(),
            item_serial: "SN-100".to_string(),
            notes: None,
            start_date: None,
            due_date: None,
            calibration_date: Some(date(2025, 1, 10)),
            valid_until: Some(date(2025, 7, 10)),
            return_date: None,
            document_number: None,
            version: 3,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn fire_date_subtracts_kind_offset() {
        let policy = ReminderPolicy::default();
        assert_eq!(
            policy.fire_date(ReminderKind::CalibrationExpiry, date(2025, 7, 10)).unwrap(),
            date(2025, 6, 10)
        );
        assert_eq!(
            policy.fire_date(ReminderKind::RentalReturn, date(2025, 3, 1)).unwrap(),
            date(2025, 2, 22)
        );
    }

    #[test]
    fn fire_date_before_the_calendar_start_is_a_validation_error() {
        let policy = ReminderPolicy::default();
        let err = policy
            .fire_date(ReminderKind::CalibrationExpiry, NaiveDate::MIN)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn offsets_must_be_positive_and_bounded() {
        assert!(ReminderPolicy::default().validate().is_ok());

        let negative = ReminderPolicy {
            calibration_expiry_days: -5,
            ..ReminderPolicy::default()
        };
        assert!(matches!(negative.validate(), Err(CoreError::Validation(_))));
        assert!(negative
            .fire_date(ReminderKind::CalibrationExpiry, date(2025, 7, 10))
            .is_err());

        let oversized = ReminderPolicy {
            rental_return_days: i64::MAX,
            ..ReminderPolicy::default()
        };
        assert!(matches!(oversized.validate(), Err(CoreError::Validation(_))));
        assert!(oversized
            .fire_date(ReminderKind::RentalReturn, date(2025, 3, 1))
            .is_err());
    }

    #[test]
    fn completed_calibration_establishes_expiry_deadline() {
        let request = completed_calibration();
        assert_eq!(
            deadline_for(&request),
            Some((ReminderKind::CalibrationExpiry, date(2025, 7, 10)))
        );
    }

    #[test]
    fn scheduling_twice_keeps_a_single_pending_reminder() {
        let store = MemoryStore::new();
        let request = completed_calibration();
        let policy = ReminderPolicy::default();
        let now = date(2025, 1, 10).and_hms_opt(10, 0, 0).unwrap();

        let first = run_in_transaction(&store, |tx| {
            schedule_reminder(tx, &policy, ReminderKind::CalibrationExpiry, date(2025, 7, 10), &request, now)
        })
        .unwrap();
        let second = run_in_transaction(&store, |tx| {
            schedule_reminder(tx, &policy, ReminderKind::CalibrationExpiry, date(2025, 7, 10), &request, now)
        })
        .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        let all = run_in_transaction(&store, |tx| tx.reminders_for_request(request.id)).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fire_date, date(2025, 6, 10));
    }

    #[test]
    fn dismiss_requires_owner_or_admin() {
        let store = MemoryStore::new();
        let request = completed_calibration();
        let policy = ReminderPolicy::default();
        let now = date(2025, 1, 10).and_hms_opt(10, 0, 0).unwrap();
        let reminder = run_in_transaction(&store, |tx| {
            schedule_reminder(tx, &policy, ReminderKind::CalibrationExpiry, date(2025, 7, 10), &request, now)
        })
        .unwrap()
        .unwrap();

        let stranger = Actor::new(Uuid::new_v4(), crate::domain::Role::User);
        let err = run_in_transaction(&store, |tx| dismiss(tx, &stranger, reminder.id)).unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let owner = Actor::new(request.owner_id, crate::domain::Role::User);
        let dismissed = run_in_transaction(&store, |tx| dismiss(tx, &owner, reminder.id)).unwrap();
        assert_eq!(dismissed.status, ReminderStatus::Dismissed);
    }
}
