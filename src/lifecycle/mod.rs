//! Request lifecycle engine.
//!
//! Every state-changing operation runs in one storage transaction that covers
//! the request row, the item status, history intervals, status logs, issued
//! documents, owner notifications and reminders. Activity entries and admin
//! broadcasts are queued and flushed after commit.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit;
use crate::clock::Clock;
use crate::domain::{
    payload, Actor, CompletionInput, DocumentType, IssuedDocument, Item, ItemHistory, ItemStatus,
    Measurement, Notification, PartLine, Reminder, RequestStatus, Role, ServiceRequest,
    StatusLogEntry, User, WorkflowKind,
};
use crate::effects::{Effect, EffectFailure, EffectQueue, FailureLog};
use crate::error::{CoreError, CoreResult};
use crate::item_sync;
use crate::notify::{self, OutboundMessage};
use crate::numbering;
use crate::reminders::{self, ReminderPolicy};
use crate::store::{run_in_transaction, Store, Tx};

pub mod documents;
pub mod rules;

#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub serial_number: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
    pub item_serial: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionCommand {
    pub target: RequestStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub completion: Option<CompletionInput>,
}

impl TransitionCommand {
    pub fn to(target: RequestStatus) -> Self {
        Self {
            target,
            notes: None,
            completion: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_completion(mut self, completion: CompletionInput) -> Self {
        self.completion = Some(completion);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub request: ServiceRequest,
    /// New item status when the transition moved the item.
    pub item_status: Option<ItemStatus>,
    pub documents: Vec<IssuedDocument>,
    pub reminder: Option<Reminder>,
    pub effect_failures: Vec<EffectFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub item: Item,
    pub holder: Option<ItemHistory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestDetail {
    pub request: ServiceRequest,
    pub status_log: Vec<StatusLogEntry>,
    pub documents: Vec<IssuedDocument>,
    pub measurements: Vec<Measurement>,
    pub service_parts: Vec<PartLine>,
    pub technical_parts: Vec<PartLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurgeReport {
    pub request_id: Uuid,
    pub released_item: bool,
    pub deleted_history_rows: usize,
    pub deleted_documents: usize,
    pub cancelled_reminders: usize,
}

/// Accepted year range for user-supplied workflow dates.
const DATE_YEARS: std::ops::RangeInclusive<i32> = 1900..=2999;

fn check_date(field: &str, date: NaiveDate) -> CoreResult<NaiveDate> {
    if DATE_YEARS.contains(&date.year()) {
        Ok(date)
    } else {
        Err(CoreError::validation(format!(
            "{field} {date} is outside {}..={}",
            DATE_YEARS.start(),
            DATE_YEARS.end()
        )))
    }
}

fn require_actor(actor: Option<&Actor>) -> CoreResult<Actor> {
    actor.copied().ok_or(CoreError::Unauthorized)
}

fn require_role(actor: &Actor, roles: &[Role], what: &str) -> CoreResult<()> {
    if roles.contains(&actor.role) {
        Ok(())
    } else {
        Err(CoreError::forbidden(format!("{what} requires one of {roles:?}")))
    }
}

fn load_request(tx: &mut dyn Tx, kind: WorkflowKind, id: Uuid) -> CoreResult<ServiceRequest> {
    tx.find_request(kind, id)?
        .ok_or_else(|| CoreError::not_found(format!("{kind} request {id}")))
}

fn load_item(tx: &mut dyn Tx, serial: &str) -> CoreResult<Item> {
    tx.find_item(serial)?
        .ok_or_else(|| CoreError::not_found(format!("item {serial}")))
}

fn save_request(tx: &mut dyn Tx, request: &ServiceRequest, expected_version: i32) -> CoreResult<()> {
    if tx.update_request(request, expected_version)? {
        Ok(())
    } else {
        Err(CoreError::conflict(format!(
            "{} request {} was modified concurrently",
            request.kind, request.id
        )))
    }
}

/// Fills in the completion fields of `next` and issues its documents.
fn complete(
    tx: &mut dyn Tx,
    next: &mut ServiceRequest,
    completion: Option<&CompletionInput>,
    now: NaiveDateTime,
) -> CoreResult<Vec<IssuedDocument>> {
    if let Some(input) = completion {
        if input.kind() != next.kind {
            return Err(CoreError::validation(format!(
                "{} completion data sent for a {} request",
                input.kind(),
                next.kind
            )));
        }
    }

    match (next.kind, completion) {
        (
            WorkflowKind::Calibration,
            Some(CompletionInput::Calibration {
                calibration_date,
                valid_until,
                results,
            }),
        ) => {
            let calibration_date = calibration_date
                .ok_or_else(|| CoreError::validation("calibration_date is required"))?;
            let calibration_date = check_date("calibration_date", calibration_date)?;
            let valid_until =
                valid_until.ok_or_else(|| CoreError::validation("valid_until is required"))?;
            let valid_until = check_date("valid_until", valid_until)?;
            if valid_until <= calibration_date {
                return Err(CoreError::validation(
                    "valid_until must be after calibration_date",
                ));
            }
            payload::validate_measurements(results)?;

            next.calibration_date = Some(calibration_date);
            next.valid_until = Some(valid_until);
            tx.replace_measurements(next.id, results)?;
            let certificate = numbering::issue_document(
                tx,
                next.id,
                DocumentType::Certificate,
                calibration_date,
                documents::certificate(next, results),
                now,
            )?;
            next.document_number = Some(certificate.number.clone());
            Ok(vec![certificate])
        }
        (WorkflowKind::Calibration, _) => Err(CoreError::validation(
            "calibration_date and valid_until are required to complete a calibration",
        )),
        (WorkflowKind::Rental, input) => {
            let requested = match input {
                Some(CompletionInput::Rental { return_date }) => *return_date,
                _ => None,
            };
            next.return_date = next.return_date.or(requested).or(Some(now));
            Ok(Vec::new())
        }
        (
            WorkflowKind::Maintenance,
            Some(CompletionInput::Maintenance {
                service_report,
                technical_report,
            }),
        ) if service_report.is_some() || technical_report.is_some() => {
            let reference = now.date();
            let mut issued = Vec::new();
            if let Some(report) = service_report {
                report.validate()?;
                tx.replace_parts(next.id, DocumentType::ServiceReport, &report.parts)?;
                issued.push(numbering::issue_document(
                    tx,
                    next.id,
                    DocumentType::ServiceReport,
                    reference,
                    documents::service_report(next, report),
                    now,
                )?);
            }
            if let Some(report) = technical_report {
                report.validate()?;
                tx.replace_parts(next.id, DocumentType::TechnicalReport, &report.parts)?;
                issued.push(numbering::issue_document(
                    tx,
                    next.id,
                    DocumentType::TechnicalReport,
                    reference,
                    documents::technical_report(next, report),
                    now,
                )?);
            }
            next.document_number = issued.first().map(|doc| doc.number.clone());
            Ok(issued)
        }
        (WorkflowKind::Maintenance, _) => Err(CoreError::validation(
            "a service report or technical report is required to complete maintenance",
        )),
    }
}

pub struct LifecycleEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    policy: ReminderPolicy,
    failures: FailureLog,
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, policy: ReminderPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            failures: FailureLog::default(),
        }
    }

    /// Side effects that failed after their primary operation committed,
    /// oldest first. Admins only.
    pub fn effect_failures(&self, actor: Option<&Actor>) -> CoreResult<Vec<EffectFailure>> {
        let actor = require_actor(actor)?;
        require_role(&actor, &[Role::Admin], "reading effect failures")?;
        Ok(self.failures.recent())
    }

    fn tx<T, F>(&self, work: F) -> CoreResult<T>
    where
        F: FnOnce(&mut dyn Tx) -> CoreResult<T>,
    {
        run_in_transaction(self.store.as_ref(), work)
    }

    fn flush(&self, effects: EffectQueue, now: NaiveDateTime) -> Vec<EffectFailure> {
        effects.flush(self.store.as_ref(), &self.failures, now)
    }

    // Users

    pub fn create_user(&self, username: &str, password_hash: &str, role: Role) -> CoreResult<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(CoreError::validation("username is required"));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: self.clock.now(),
        };
        self.tx(|tx| tx.insert_user(&user))?;
        info!(user_id = %user.id, username = %user.username, role = %role, "created user");
        Ok(user)
    }

    pub fn user(&self, id: Uuid) -> CoreResult<User> {
        self.tx(|tx| tx.find_user(id))?
            .ok_or_else(|| CoreError::not_found(format!("user {id}")))
    }

    pub fn user_by_username(&self, username: &str) -> CoreResult<Option<User>> {
        self.tx(|tx| tx.find_user_by_username(username))
    }

    // Items

    pub fn register_item(&self, actor: Option<&Actor>, new: NewItem) -> CoreResult<Item> {
        let actor = require_actor(actor)?;
        require_role(&actor, &[Role::Admin], "registering items")?;
        let serial = new.serial_number.trim();
        if serial.is_empty() || new.name.trim().is_empty() {
            return Err(CoreError::validation("serial_number and name are required"));
        }

        let now = self.clock.now();
        let item = Item {
            serial_number: serial.to_string(),
            name: new.name.trim().to_string(),
            status: ItemStatus::Available,
            last_verified_at: None,
            created_at: now,
            updated_at: now,
        };
        self.tx(|tx| tx.insert_item(&item))?;

        let mut effects = EffectQueue::new();
        effects.push(Effect::Activity(audit::activity(
            actor.id,
            "item.registered",
            "item",
            &item.serial_number,
            json!({ "name": item.name }),
            now,
        )));
        self.flush(effects, now);
        Ok(item)
    }

    pub fn item(&self, actor: Option<&Actor>, serial: &str) -> CoreResult<ItemView> {
        require_actor(actor)?;
        self.tx(|tx| {
            let item = load_item(tx, serial)?;
            let holder = audit::current_holder(tx, serial)?;
            Ok(ItemView { item, holder })
        })
    }

    pub fn item_history(&self, actor: Option<&Actor>, serial: &str) -> CoreResult<Vec<ItemHistory>> {
        require_actor(actor)?;
        self.tx(|tx| {
            load_item(tx, serial)?;
            tx.item_histories(serial)
        })
    }

    /// Marks an idle item available or damaged.
    pub fn set_item_status(
        &self,
        actor: Option<&Actor>,
        serial: &str,
        status: ItemStatus,
    ) -> CoreResult<Item> {
        let actor = require_actor(actor)?;
        require_role(&actor, &[Role::Admin, Role::Manager], "changing item status")?;
        let now = self.clock.now();
        let item = self.tx(|tx| item_sync::set_idle_status(tx, serial, status, now))?;

        let mut effects = EffectQueue::new();
        effects.push(Effect::Activity(audit::activity(
            actor.id,
            "item.status",
            "item",
            serial,
            json!({ "status": status }),
            now,
        )));
        self.flush(effects, now);
        Ok(item)
    }

    // Requests

    pub fn create_request(
        &self,
        actor: Option<&Actor>,
        kind: WorkflowKind,
        new: NewRequest,
    ) -> CoreResult<ServiceRequest> {
        let actor = require_actor(actor)?;
        let now = self.clock.now();

        if let Some(start) = new.start_date {
            check_date("start_date", start)?;
        }
        if let Some(due) = new.due_date {
            check_date("due_date", due)?;
        }
        if let (Some(start), Some(due)) = (new.start_date, new.due_date) {
            if due < start {
                return Err(CoreError::validation("due_date must not precede start_date"));
            }
        }
        if kind == WorkflowKind::Rental {
            let due = new
                .due_date
                .ok_or_else(|| CoreError::validation("due_date is required for a rental"))?;
            if due < now.date() {
                return Err(CoreError::validation("due_date is in the past"));
            }
        }

        let status = rules::initial_status(kind, &actor);
        let request = ServiceRequest {
            id: Uuid::new_v4(),
            kind,
            status,
            owner_id: actor.id,
            item_serial: new.item_serial.trim().to_string(),
            notes: new.notes.clone(),
            start_date: new.start_date,
            due_date: new.due_date,
            calibration_date: None,
            valid_until: None,
            return_date: None,
            document_number: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.tx(|tx| {
            load_item(tx, &request.item_serial)?;
            tx.insert_request(&request)?;
            audit::record_status(tx, &request, actor.id, request.notes.as_deref(), now)?;
            let effect = item_sync::entry_effect(kind, status);
            item_sync::apply_effect(tx, &request, effect, request.notes.as_deref(), now)?;
            Ok(())
        })?;

        let mut effects = EffectQueue::new();
        effects.push(Effect::Activity(audit::activity(
            actor.id,
            "request.created",
            kind.as_str(),
            request.id,
            json!({ "item_serial": request.item_serial, "status": status }),
            now,
        )));
        effects.extend(notify::creation_broadcasts(&request, &actor));
        self.flush(effects, now);

        info!(request_id = %request.id, kind = %kind, status = %status, "request created");
        Ok(request)
    }

    pub fn request_detail(
        &self,
        actor: Option<&Actor>,
        kind: WorkflowKind,
        id: Uuid,
    ) -> CoreResult<RequestDetail> {
        let actor = require_actor(actor)?;
        self.tx(|tx| {
            let request = load_request(tx, kind, id)?;
            if !rules::can_view(&actor, &request) {
                return Err(CoreError::forbidden("not allowed to view this request"));
            }
            Ok(RequestDetail {
                status_log: tx.status_logs(kind, id)?,
                documents: tx.documents_for_request(id)?,
                measurements: tx.measurements(id)?,
                service_parts: tx.parts(id, DocumentType::ServiceReport)?,
                technical_parts: tx.parts(id, DocumentType::TechnicalReport)?,
                request,
            })
        })
    }

    /// Moves a request to `command.target`.
    ///
    /// Checks run in order: missing actor, missing request, permission,
    /// reachability, completion data. Any failure leaves storage untouched.
    pub fn transition(
        &self,
        actor: Option<&Actor>,
        kind: WorkflowKind,
        id: Uuid,
        command: TransitionCommand,
    ) -> CoreResult<TransitionOutcome> {
        let actor = require_actor(actor)?;
        let now = self.clock.now();
        let policy = self.policy;
        let notes = command.notes.as_deref();

        let (request, previous, item_status, documents, reminder) = self.tx(|tx| {
            let current = load_request(tx, kind, id)?;
            rules::authorize(&actor, &current, command.target)?;
            rules::check_transition(kind, current.status, command.target)?;

            let mut next = current.clone();
            next.status = command.target;
            next.updated_at = now;
            next.version = current.version + 1;

            let documents = if command.target == RequestStatus::Completed {
                complete(tx, &mut next, command.completion.as_ref(), now)?
            } else if command.completion.is_some() {
                return Err(CoreError::validation(
                    "completion data is only accepted when completing a request",
                ));
            } else {
                Vec::new()
            };

            save_request(tx, &next, current.version)?;

            let effect = item_sync::item_effect(kind, current.status, next.status);
            let item_status = item_sync::apply_effect(tx, &next, effect, notes, now)?;

            audit::record_status(tx, &next, actor.id, notes, now)?;
            notify::notify_owner(tx, &next, &actor, now)?;

            let reminder = match reminders::deadline_for(&next) {
                Some((reminder_kind, due)) => {
                    reminders::schedule_reminder(tx, &policy, reminder_kind, due, &next, now)?
                }
                None => None,
            };
            if let Some(obsolete) = reminders::obsoleted_by(&next) {
                reminders::cancel_pending(tx, next.id, Some(obsolete))?;
            }

            Ok((next, current.status, item_status, documents, reminder))
        })?;

        let mut effects = EffectQueue::new();
        effects.push(Effect::Activity(audit::activity(
            actor.id,
            &format!("request.{}", request.status.as_str().to_lowercase()),
            kind.as_str(),
            request.id,
            json!({
                "from": previous,
                "to": request.status,
                "item_serial": request.item_serial,
                "document_number": request.document_number,
            }),
            now,
        )));
        effects.extend(notify::admin_broadcast(&request, &actor));
        let effect_failures = self.flush(effects, now);

        info!(
            request_id = %request.id,
            kind = %kind,
            from = %previous,
            to = %request.status,
            actor_id = %actor.id,
            "request transitioned"
        );
        Ok(TransitionOutcome {
            request,
            item_status,
            documents,
            reminder,
            effect_failures,
        })
    }

    /// Rebuilds an issued certificate or report from the stored rows. The
    /// number is kept unless `recreate` asks for a fresh one.
    pub fn regenerate_document(
        &self,
        actor: Option<&Actor>,
        kind: WorkflowKind,
        id: Uuid,
        doc_type: DocumentType,
        recreate: bool,
    ) -> CoreResult<IssuedDocument> {
        let actor = require_actor(actor)?;
        let now = self.clock.now();

        let document = self.tx(|tx| {
            let current = load_request(tx, kind, id)?;
            if !kind.is_authorizer(actor.role) {
                return Err(CoreError::forbidden("regenerating documents requires an authorizing role"));
            }
            if !documents::belongs_to(doc_type, kind) {
                return Err(CoreError::validation(format!(
                    "{kind} requests carry no {doc_type} document"
                )));
            }
            if current.status != RequestStatus::Completed {
                return Err(CoreError::validation("only completed requests carry documents"));
            }
            let existing = tx.find_document(id, doc_type)?.ok_or_else(|| {
                CoreError::not_found(format!("{doc_type} document for request {id}"))
            })?;

            let content = documents::rebuild(tx, &current, &existing)?;
            let reference = documents::reference_date(&current, &existing)?;
            let document =
                numbering::regenerate_document(tx, id, doc_type, reference, content, recreate, now)?;

            if current.document_number.as_deref() == Some(existing.number.as_str())
                && document.number != existing.number
            {
                let mut next = current.clone();
                next.document_number = Some(document.number.clone());
                next.version = current.version + 1;
                next.updated_at = now;
                save_request(tx, &next, current.version)?;
            }
            Ok(document)
        })?;

        let mut effects = EffectQueue::new();
        effects.push(Effect::Activity(audit::activity(
            actor.id,
            "document.regenerated",
            kind.as_str(),
            id,
            json!({ "doc_type": doc_type, "number": document.number, "recreate": recreate }),
            now,
        )));
        self.flush(effects, now);
        Ok(document)
    }

    /// Deletes a request and everything derived from it, releasing its item.
    /// Minted numbers are not handed out again.
    pub fn purge_request(
        &self,
        actor: Option<&Actor>,
        kind: WorkflowKind,
        id: Uuid,
    ) -> CoreResult<PurgeReport> {
        let actor = require_actor(actor)?;
        require_role(&actor, &[Role::Admin], "purging requests")?;
        let now = self.clock.now();

        let report = self.tx(|tx| {
            let request = load_request(tx, kind, id)?;

            let held = audit::current_holder(tx, &request.item_serial)?
                .is_some_and(|holder| holder.request_id == request.id && holder.kind == kind);
            if held {
                let engaged = item_sync::engaged_status(kind);
                if !tx.swap_item_status(&request.item_serial, engaged, ItemStatus::Available, None, now)? {
                    return Err(CoreError::conflict(format!(
                        "item {} is no longer {engaged}",
                        request.item_serial
                    )));
                }
            }
            let deleted_history_rows = tx.delete_histories_for_request(kind, id)?;

            let cancelled_reminders = reminders::cancel_pending(tx, id, None)?;
            let mut deleted_documents = 0;
            for document in tx.documents_for_request(id)? {
                if tx.delete_document(document.id)? {
                    deleted_documents += 1;
                }
            }
            tx.replace_measurements(id, &[])?;
            tx.replace_parts(id, DocumentType::ServiceReport, &[])?;
            tx.replace_parts(id, DocumentType::TechnicalReport, &[])?;
            tx.delete_status_logs(kind, id)?;
            tx.delete_request(kind, id)?;

            Ok(PurgeReport {
                request_id: id,
                released_item: held,
                deleted_history_rows,
                deleted_documents,
                cancelled_reminders,
            })
        })?;

        let mut effects = EffectQueue::new();
        effects.push(Effect::Activity(audit::activity(
            actor.id,
            "request.purged",
            kind.as_str(),
            id,
            json!({ "released_item": report.released_item }),
            now,
        )));
        self.flush(effects, now);
        info!(request_id = %id, kind = %kind, "request purged");
        Ok(report)
    }

    // Reminders and notifications

    /// Due reminders of the actor. The first fetch after a reminder's fire date
    /// creates its inbox entry.
    pub fn due_reminders(&self, actor: Option<&Actor>) -> CoreResult<Vec<Reminder>> {
        let actor = require_actor(actor)?;
        let now = self.clock.now();
        self.tx(|tx| notify::dispatch_due(tx, now.date(), Some(actor.id), now))
    }

    pub fn dismiss_reminder(&self, actor: Option<&Actor>, id: Uuid) -> CoreResult<Reminder> {
        let actor = require_actor(actor)?;
        self.tx(|tx| reminders::dismiss(tx, &actor, id))
    }

    pub fn notifications(&self, actor: Option<&Actor>) -> CoreResult<Vec<Notification>> {
        let actor = require_actor(actor)?;
        self.tx(|tx| notify::inbox(tx, &actor))
    }

    pub fn mark_notification_read(&self, actor: Option<&Actor>, id: Uuid) -> CoreResult<Notification> {
        let actor = require_actor(actor)?;
        self.tx(|tx| notify::mark_read(tx, &actor, id))
    }

    pub fn delete_notification(&self, actor: Option<&Actor>, id: Uuid) -> CoreResult<()> {
        let actor = require_actor(actor)?;
        self.tx(|tx| notify::delete(tx, &actor, id))
    }

    /// Creates inbox entries for every due reminder and returns the messages
    /// still waiting for the outbound channel.
    pub fn pending_outbound(&self) -> CoreResult<Vec<OutboundMessage>> {
        let now = self.clock.now();
        self.tx(|tx| {
            notify::dispatch_due(tx, now.date(), None, now)?;
            notify::pending_outbound(tx, now.date())
        })
    }

    pub fn mark_email_sent(&self, reminder_id: Uuid) -> CoreResult<()> {
        self.tx(|tx| notify::mark_email_sent(tx, reminder_id))
    }
}
