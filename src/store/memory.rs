//! In-process store with the same transactional contract as [`super::PgStore`].
//!
//! A transaction works on a clone of the data and swaps it in on success, so a
//! failing closure never leaks partial writes. Named operations can be made to
//! fail on demand to exercise rollback paths.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    ActivityEntry, DocumentType, IssuedDocument, Item, ItemHistory, ItemStatus, Measurement,
    Notification, PartLine, Reminder, ReminderKind, ReminderStatus, Role, ServiceRequest,
    StatusLogEntry, User, WorkflowKind,
};
use crate::error::{CoreError, CoreResult};
use crate::store::{Store, Tx, TxWork};

#[derive(Debug, Clone, Default)]
struct MemoryData {
    users: Vec<User>,
    items: Vec<Item>,
    requests: Vec<ServiceRequest>,
    status_logs: Vec<StatusLogEntry>,
    histories: Vec<ItemHistory>,
    sequences: HashMap<(DocumentType, String), i64>,
    documents: Vec<IssuedDocument>,
    measurements: HashMap<Uuid, Vec<Measurement>>,
    parts: HashMap<(Uuid, DocumentType), Vec<PartLine>>,
    reminders: Vec<Reminder>,
    notifications: Vec<Notification>,
    activities: Vec<ActivityEntry>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
    failures: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call to the named `Tx` method fail with a storage error.
    pub fn fail_on(&self, operation: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl Store for MemoryStore {
    fn transaction(&self, work: TxWork<'_>) -> CoreResult<()> {
        let failures = self
            .failures
            .lock()
            .map_err(|_| CoreError::storage("memory store failure set poisoned"))?
            .clone();
        let mut guard = self
            .data
            .lock()
            .map_err(|_| CoreError::storage("memory store poisoned"))?;
        let mut working = guard.clone();
        work(&mut MemoryTx {
            data: &mut working,
            failures: &failures,
        })?;
        *guard = working;
        Ok(())
    }
}

struct MemoryTx<'a> {
    data: &'a mut MemoryData,
    failures: &'a HashSet<String>,
}

impl MemoryTx<'_> {
    fn check(&self, operation: &str) -> CoreResult<()> {
        if self.failures.contains(operation) {
            return Err(CoreError::storage(format!("injected failure in {operation}")));
        }
        Ok(())
    }
}

impl Tx for MemoryTx<'_> {
    fn insert_user(&mut self, user: &User) -> CoreResult<()> {
        self.check("insert_user")?;
        if self.data.users.iter().any(|u| u.username == user.username) {
            return Err(CoreError::conflict(format!(
                "username {} already exists",
                user.username
            )));
        }
        self.data.users.push(user.clone());
        Ok(())
    }

    fn find_user(&mut self, id: Uuid) -> CoreResult<Option<User>> {
        self.check("find_user")?;
        Ok(self.data.users.iter().find(|u| u.id == id).cloned())
    }

    fn find_user_by_username(&mut self, username: &str) -> CoreResult<Option<User>> {
        self.check("find_user_by_username")?;
        Ok(self
            .data
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    fn user_ids_with_role(&mut self, role: Role) -> CoreResult<Vec<Uuid>> {
        self.check("user_ids_with_role")?;
        Ok(self
            .data
            .users
            .iter()
            .filter(|u| u.role == role)
            .map(|u| u.id)
            .collect())
    }

    fn insert_item(&mut self, item: &Item) -> CoreResult<()> {
        self.check("insert_item")?;
        if self
            .data
            .items
            .iter()
            .any(|i| i.serial_number == item.serial_number)
        {
            return Err(CoreError::conflict(format!(
                "item {} already registered",
                item.serial_number
            )));
        }
        self.data.items.push(item.clone());
        Ok(())
    }

    fn find_item(&mut self, serial: &str) -> CoreResult<Option<Item>> {
        self.check("find_item")?;
        Ok(self
            .data
            .items
            .iter()
            .find(|i| i.serial_number == serial)
            .cloned())
    }

    fn swap_item_status(
        &mut self,
        serial: &str,
        expected: ItemStatus,
        next: ItemStatus,
        verified_at: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> CoreResult<bool> {
        self.check("swap_item_status")?;
        let Some(item) = self
            .data
            .items
            .iter_mut()
            .find(|i| i.serial_number == serial && i.status == expected)
        else {
            return Ok(false);
        };
        item.status = next;
        if verified_at.is_some() {
            item.last_verified_at = verified_at;
        }
        item.updated_at = now;
        Ok(true)
    }

    fn insert_request(&mut self, request: &ServiceRequest) -> CoreResult<()> {
        self.check("insert_request")?;
        self.data.requests.push(request.clone());
        Ok(())
    }

    fn find_request(
        &mut self,
        kind: WorkflowKind,
        id: Uuid,
    ) -> CoreResult<Option<ServiceRequest>> {
        self.check("find_request")?;
        Ok(self
            .data
            .requests
            .iter()
            .find(|r| r.kind == kind && r.id == id)
            .cloned())
    }

    fn update_request(
        &mut self,
        request: &ServiceRequest,
        expected_version: i32,
    ) -> CoreResult<bool> {
        self.check("update_request")?;
        let Some(stored) = self.data.requests.iter_mut().find(|r| {
            r.kind == request.kind && r.id == request.id && r.version == expected_version
        }) else {
            return Ok(false);
        };
        *stored = request.clone();
        Ok(true)
    }

    fn delete_request(&mut self, kind: WorkflowKind, id: Uuid) -> CoreResult<bool> {
        self.check("delete_request")?;
        let before = self.data.requests.len();
        self.data
            .requests
            .retain(|r| !(r.kind == kind && r.id == id));
        Ok(self.data.requests.len() != before)
    }

    fn append_status_log(&mut self, entry: &StatusLogEntry) -> CoreResult<()> {
        self.check("append_status_log")?;
        self.data.status_logs.push(entry.clone());
        Ok(())
    }

    fn status_logs(
        &mut self,
        kind: WorkflowKind,
        request_id: Uuid,
    ) -> CoreResult<Vec<StatusLogEntry>> {
        self.check("status_logs")?;
        Ok(self
            .data
            .status_logs
            .iter()
            .filter(|e| e.kind == kind && e.request_id == request_id)
            .cloned()
            .collect())
    }

    fn delete_status_logs(&mut self, kind: WorkflowKind, request_id: Uuid) -> CoreResult<usize> {
        self.check("delete_status_logs")?;
        let before = self.data.status_logs.len();
        self.data
            .status_logs
            .retain(|e| !(e.kind == kind && e.request_id == request_id));
        Ok(before - self.data.status_logs.len())
    }

    fn insert_history(&mut self, row: &ItemHistory) -> CoreResult<()> {
        self.check("insert_history")?;
        self.data.histories.push(row.clone());
        Ok(())
    }

    fn open_histories(&mut self, serial: &str) -> CoreResult<Vec<ItemHistory>> {
        self.check("open_histories")?;
        Ok(self
            .data
            .histories
            .iter()
            .filter(|h| h.item_serial == serial && h.is_open())
            .cloned()
            .collect())
    }

    fn close_history(
        &mut self,
        id: Uuid,
        ended_at: NaiveDateTime,
        closing_note: Option<&str>,
    ) -> CoreResult<bool> {
        self.check("close_history")?;
        let Some(row) = self
            .data
            .histories
            .iter_mut()
            .find(|h| h.id == id && h.is_open())
        else {
            return Ok(false);
        };
        row.ended_at = Some(ended_at);
        row.closing_note = closing_note.map(str::to_string);
        Ok(true)
    }

    fn item_histories(&mut self, serial: &str) -> CoreResult<Vec<ItemHistory>> {
        self.check("item_histories")?;
        let mut rows: Vec<ItemHistory> = self
            .data
            .histories
            .iter()
            .filter(|h| h.item_serial == serial)
            .cloned()
            .collect();
        rows.sort_by_key(|h| h.started_at);
        Ok(rows)
    }

    fn delete_histories_for_request(
        &mut self,
        kind: WorkflowKind,
        request_id: Uuid,
    ) -> CoreResult<usize> {
        self.check("delete_histories_for_request")?;
        let before = self.data.histories.len();
        self.data
            .histories
            .retain(|h| !(h.kind == kind && h.request_id == request_id));
        Ok(before - self.data.histories.len())
    }

    fn next_sequence(&mut self, doc_type: DocumentType, period: &str) -> CoreResult<i64> {
        self.check("next_sequence")?;
        let counter = self
            .data
            .sequences
            .entry((doc_type, period.to_string()))
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    #[cfg(test)]
    fn count_documents(
        &mut self,
        doc_type: DocumentType,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> CoreResult<i64> {
        self.check("count_documents")?;
        let count = self
            .data
            .documents
            .iter()
            .filter(|d| d.doc_type == doc_type && d.issued_at >= from && d.issued_at < until)
            .count();
        Ok(count as i64)
    }

    fn insert_document(&mut self, document: &IssuedDocument) -> CoreResult<()> {
        self.check("insert_document")?;
        if self
            .data
            .documents
            .iter()
            .any(|d| d.doc_type == document.doc_type && d.number == document.number)
        {
            return Err(CoreError::conflict(format!(
                "document number {} already issued",
                document.number
            )));
        }
        if self
            .data
            .documents
            .iter()
            .any(|d| d.doc_type == document.doc_type && d.request_id == document.request_id)
        {
            return Err(CoreError::conflict(format!(
                "{} already issued for request {}",
                document.doc_type, document.request_id
            )));
        }
        self.data.documents.push(document.clone());
        Ok(())
    }

    fn find_document(
        &mut self,
        request_id: Uuid,
        doc_type: DocumentType,
    ) -> CoreResult<Option<IssuedDocument>> {
        self.check("find_document")?;
        Ok(self
            .data
            .documents
            .iter()
            .find(|d| d.request_id == request_id && d.doc_type == doc_type)
            .cloned())
    }

    fn update_document_content(
        &mut self,
        id: Uuid,
        content: &Value,
        regenerated_at: NaiveDateTime,
    ) -> CoreResult<()> {
        self.check("update_document_content")?;
        let document = self
            .data
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| CoreError::not_found(format!("document {id}")))?;
        document.content = content.clone();
        document.regenerated_at = Some(regenerated_at);
        Ok(())
    }

    fn delete_document(&mut self, id: Uuid) -> CoreResult<bool> {
        self.check("delete_document")?;
        let before = self.data.documents.len();
        self.data.documents.retain(|d| d.id != id);
        Ok(self.data.documents.len() != before)
    }

    fn documents_for_request(&mut self, request_id: Uuid) -> CoreResult<Vec<IssuedDocument>> {
        self.check("documents_for_request")?;
        Ok(self
            .data
            .documents
            .iter()
            .filter(|d| d.request_id == request_id)
            .cloned()
            .collect())
    }

    fn replace_measurements(&mut self, request_id: Uuid, rows: &[Measurement]) -> CoreResult<()> {
        self.check("replace_measurements")?;
        if rows.is_empty() {
            self.data.measurements.remove(&request_id);
        } else {
            self.data.measurements.insert(request_id, rows.to_vec());
        }
        Ok(())
    }

    fn measurements(&mut self, request_id: Uuid) -> CoreResult<Vec<Measurement>> {
        self.check("measurements")?;
        Ok(self
            .data
            .measurements
            .get(&request_id)
            .cloned()
            .unwrap_or_default())
    }

    fn replace_parts(
        &mut self,
        request_id: Uuid,
        doc_type: DocumentType,
        rows: &[PartLine],
    ) -> CoreResult<()> {
        self.check("replace_parts")?;
        if rows.is_empty() {
            self.data.parts.remove(&(request_id, doc_type));
        } else {
            self.data.parts.insert((request_id, doc_type), rows.to_vec());
        }
        Ok(())
    }

    fn parts(&mut self, request_id: Uuid, doc_type: DocumentType) -> CoreResult<Vec<PartLine>> {
        self.check("parts")?;
        Ok(self
            .data
            .parts
            .get(&(request_id, doc_type))
            .cloned()
            .unwrap_or_default())
    }

    fn insert_reminder(&mut self, reminder: &Reminder) -> CoreResult<()> {
        self.check("insert_reminder")?;
        self.data.reminders.push(reminder.clone());
        Ok(())
    }

    fn find_reminder(&mut self, id: Uuid) -> CoreResult<Option<Reminder>> {
        self.check("find_reminder")?;
        Ok(self.data.reminders.iter().find(|r| r.id == id).cloned())
    }

    fn find_pending_reminder(
        &mut self,
        kind: ReminderKind,
        related_request_id: Uuid,
    ) -> CoreResult<Option<Reminder>> {
        self.check("find_pending_reminder")?;
        Ok(self
            .data
            .reminders
            .iter()
            .find(|r| {
                r.kind == kind
                    && r.related_request_id == related_request_id
                    && r.status == ReminderStatus::Pending
            })
            .cloned())
    }

    fn due_reminders(
        &mut self,
        today: NaiveDate,
        owner: Option<Uuid>,
    ) -> CoreResult<Vec<Reminder>> {
        self.check("due_reminders")?;
        let mut rows: Vec<Reminder> = self
            .data
            .reminders
            .iter()
            .filter(|r| r.status == ReminderStatus::Pending && r.fire_date <= today)
            .filter(|r| owner.map_or(true, |owner| r.owner_id == owner))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.fire_date);
        Ok(rows)
    }

    fn reminders_for_request(&mut self, request_id: Uuid) -> CoreResult<Vec<Reminder>> {
        self.check("reminders_for_request")?;
        Ok(self
            .data
            .reminders
            .iter()
            .filter(|r| r.related_request_id == request_id)
            .cloned()
            .collect())
    }

    fn update_reminder(&mut self, reminder: &Reminder) -> CoreResult<()> {
        self.check("update_reminder")?;
        let stored = self
            .data
            .reminders
            .iter_mut()
            .find(|r| r.id == reminder.id)
            .ok_or_else(|| CoreError::not_found(format!("reminder {}", reminder.id)))?;
        *stored = reminder.clone();
        Ok(())
    }

    fn insert_notification(&mut self, notification: &Notification) -> CoreResult<()> {
        self.check("insert_notification")?;
        self.data.notifications.push(notification.clone());
        Ok(())
    }

    fn find_notification(&mut self, id: Uuid) -> CoreResult<Option<Notification>> {
        self.check("find_notification")?;
        Ok(self
            .data
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    fn notifications_for(&mut self, recipient_id: Uuid) -> CoreResult<Vec<Notification>> {
        self.check("notifications_for")?;
        let mut rows: Vec<Notification> = self
            .data
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.is_read
                .cmp(&b.is_read)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(rows)
    }

    fn mark_notification_read(&mut self, id: Uuid) -> CoreResult<bool> {
        self.check("mark_notification_read")?;
        let Some(notification) = self.data.notifications.iter_mut().find(|n| n.id == id) else {
            return Ok(false);
        };
        notification.is_read = true;
        Ok(true)
    }

    fn delete_notification(&mut self, id: Uuid) -> CoreResult<bool> {
        self.check("delete_notification")?;
        let before = self.data.notifications.len();
        self.data.notifications.retain(|n| n.id != id);
        Ok(self.data.notifications.len() != before)
    }

    fn insert_activity(&mut self, entry: &ActivityEntry) -> CoreResult<()> {
        self.check("insert_activity")?;
        self.data.activities.push(entry.clone());
        Ok(())
    }

    fn activities_for(&mut self, entity: &str, entity_id: &str) -> CoreResult<Vec<ActivityEntry>> {
        self.check("activities_for")?;
        Ok(self
            .data
            .activities
            .iter()
            .filter(|a| a.entity == entity && a.entity_id == entity_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::store::run_in_transaction;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn item(serial: &str) -> Item {
        Item {
            serial_number: serial.to_string(),
            name: "Gas detector".to_string(),
            status: ItemStatus::Available,
            last_verified_at: None,
            created_at: at(1),
            updated_at: at(1),
        }
    }

    #[test]
    fn failed_transaction_discards_its_writes() {
        let store = MemoryStore::new();
        let result: CoreResult<()> = run_in_transaction(&store, |tx| {
            tx.insert_item(&item("SN-1"))?;
            Err(CoreError::validation("abort"))
        });
        assert!(result.is_err());

        let found = run_in_transaction(&store, |tx| tx.find_item("SN-1")).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn swap_item_status_requires_expected_status() {
        let store = MemoryStore::new();
        run_in_transaction(&store, |tx| tx.insert_item(&item("SN-1"))).unwrap();

        let swapped = run_in_transaction(&store, |tx| {
            tx.swap_item_status("SN-1", ItemStatus::Rented, ItemStatus::Available, None, at(2))
        })
        .unwrap();
        assert!(!swapped);

        let swapped = run_in_transaction(&store, |tx| {
            tx.swap_item_status("SN-1", ItemStatus::Available, ItemStatus::Rented, None, at(2))
        })
        .unwrap();
        assert!(swapped);
    }

    #[test]
    fn injected_failures_surface_as_storage_errors() {
        let store = MemoryStore::new();
        store.fail_on("insert_item");
        let err = run_in_transaction(&store, |tx| tx.insert_item(&item("SN-1"))).unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));

        store.clear_failures();
        run_in_transaction(&store, |tx| tx.insert_item(&item("SN-1"))).unwrap();
    }
}
