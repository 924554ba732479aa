//! Transactional storage collaborator.
//!
//! Every write in the core happens inside [`Store::transaction`]; a closure that
//! returns `Err` leaves the store exactly as it was before the call.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    ActivityEntry, DocumentType, IssuedDocument, Item, ItemHistory, ItemStatus, Measurement,
    Notification, PartLine, Reminder, ReminderKind, Role, ServiceRequest, StatusLogEntry, User,
    WorkflowKind,
};
use crate::error::{CoreError, CoreResult};

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

pub type TxWork<'a> = Box<dyn FnOnce(&mut dyn Tx) -> CoreResult<()> + 'a>;

pub trait Store: Send + Sync + 'static {
    fn transaction(&self, work: TxWork<'_>) -> CoreResult<()>;
}

/// Runs `work` in one transaction and hands back its result.
pub fn run_in_transaction<T, F>(store: &dyn Store, work: F) -> CoreResult<T>
where
    F: FnOnce(&mut dyn Tx) -> CoreResult<T>,
{
    let mut output = None;
    store.transaction(Box::new(|tx| {
        output = Some(work(tx)?);
        Ok(())
    }))?;
    output.ok_or_else(|| CoreError::storage("transaction finished without a result"))
}

/// Row-level operations available inside a transaction.
pub trait Tx {
    fn insert_user(&mut self, user: &User) -> CoreResult<()>;
    fn find_user(&mut self, id: Uuid) -> CoreResult<Option<User>>;
    fn find_user_by_username(&mut self, username: &str) -> CoreResult<Option<User>>;
    fn user_ids_with_role(&mut self, role: Role) -> CoreResult<Vec<Uuid>>;

    fn insert_item(&mut self, item: &Item) -> CoreResult<()>;
    fn find_item(&mut self, serial: &str) -> CoreResult<Option<Item>>;
    /// Compare-and-swap on the item status. Returns `false` when the stored
    /// status is not `expected` (or the item does not exist).
    fn swap_item_status(
        &mut self,
        serial: &str,
        expected: ItemStatus,
        next: ItemStatus,
        verified_at: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> CoreResult<bool>;

    fn insert_request(&mut self, request: &ServiceRequest) -> CoreResult<()>;
    fn find_request(&mut self, kind: WorkflowKind, id: Uuid)
        -> CoreResult<Option<ServiceRequest>>;
    /// Writes `request` only if the stored version equals `expected_version`.
    fn update_request(&mut self, request: &ServiceRequest, expected_version: i32)
        -> CoreResult<bool>;
    fn delete_request(&mut self, kind: WorkflowKind, id: Uuid) -> CoreResult<bool>;

    fn append_status_log(&mut self, entry: &StatusLogEntry) -> CoreResult<()>;
    fn status_logs(&mut self, kind: WorkflowKind, request_id: Uuid)
        -> CoreResult<Vec<StatusLogEntry>>;
    fn delete_status_logs(&mut self, kind: WorkflowKind, request_id: Uuid) -> CoreResult<usize>;

    fn insert_history(&mut self, row: &ItemHistory) -> CoreResult<()>;
    fn open_histories(&mut self, serial: &str) -> CoreResult<Vec<ItemHistory>>;
    /// Sets the end date on an open row. Returns `false` if the row was already closed.
    fn close_history(
        &mut self,
        id: Uuid,
        ended_at: NaiveDateTime,
        closing_note: Option<&str>,
    ) -> CoreResult<bool>;
    fn item_histories(&mut self, serial: &str) -> CoreResult<Vec<ItemHistory>>;
    fn delete_histories_for_request(&mut self, kind: WorkflowKind, request_id: Uuid)
        -> CoreResult<usize>;

    /// Atomically increments and returns the counter for `(doc_type, period)`.
    fn next_sequence(&mut self, doc_type: DocumentType, period: &str) -> CoreResult<i64>;
    /// Issued documents of `doc_type` in `[from, until)`. Only the numbering
    /// tests use it, to contrast counting with the counter.
    #[cfg(test)]
    fn count_documents(
        &mut self,
        doc_type: DocumentType,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> CoreResult<i64>;
    fn insert_document(&mut self, document: &IssuedDocument) -> CoreResult<()>;
    fn find_document(&mut self, request_id: Uuid, doc_type: DocumentType)
        -> CoreResult<Option<IssuedDocument>>;
    fn update_document_content(
        &mut self,
        id: Uuid,
        content: &Value,
        regenerated_at: NaiveDateTime,
    ) -> CoreResult<()>;
    fn delete_document(&mut self, id: Uuid) -> CoreResult<bool>;
    fn documents_for_request(&mut self, request_id: Uuid) -> CoreResult<Vec<IssuedDocument>>;

    fn replace_measurements(&mut self, request_id: Uuid, rows: &[Measurement]) -> CoreResult<()>;
    fn measurements(&mut self, request_id: Uuid) -> CoreResult<Vec<Measurement>>;
    fn replace_parts(
        &mut self,
        request_id: Uuid,
        doc_type: DocumentType,
        rows: &[PartLine],
    ) -> CoreResult<()>;
    fn parts(&mut self, request_id: Uuid, doc_type: DocumentType) -> CoreResult<Vec<PartLine>>;

    fn insert_reminder(&mut self, reminder: &Reminder) -> CoreResult<()>;
    fn find_reminder(&mut self, id: Uuid) -> CoreResult<Option<Reminder>>;
    fn find_pending_reminder(&mut self, kind: ReminderKind, related_request_id: Uuid)
        -> CoreResult<Option<Reminder>>;
    /// Pending reminders whose fire date is on or before `today`.
    fn due_reminders(&mut self, today: NaiveDate, owner: Option<Uuid>)
        -> CoreResult<Vec<Reminder>>;
    fn reminders_for_request(&mut self, request_id: Uuid) -> CoreResult<Vec<Reminder>>;
    fn update_reminder(&mut self, reminder: &Reminder) -> CoreResult<()>;

    fn insert_notification(&mut self, notification: &Notification) -> CoreResult<()>;
    fn find_notification(&mut self, id: Uuid) -> CoreResult<Option<Notification>>;
    fn notifications_for(&mut self, recipient_id: Uuid) -> CoreResult<Vec<Notification>>;
    fn mark_notification_read(&mut self, id: Uuid) -> CoreResult<bool>;
    fn delete_notification(&mut self, id: Uuid) -> CoreResult<bool>;

    fn insert_activity(&mut self, entry: &ActivityEntry) -> CoreResult<()>;
    fn activities_for(&mut self, entity: &str, entity_id: &str) -> CoreResult<Vec<ActivityEntry>>;
}
