//! Diesel row types. Statuses are stored as their string codes and parsed
//! back into domain enums when rows are loaded.

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::{
    ActivityEntry, IssuedDocument, Item, ItemHistory, Measurement, Notification, PartLine,
    Reminder, ServiceRequest, StatusLogEntry, User,
};
use crate::error::{CoreError, CoreResult};
use crate::schema::*;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = users)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = items)]
pub struct ItemRow {
    pub serial_number: String,
    pub name: String,
    pub status: String,
    pub last_verified_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = service_requests)]
#[diesel(treat_none_as_null = true)]
pub struct RequestRow {
    pub id: Uuid,
    pub kind: String,
    pub status: String,
    pub owner_id: Uuid,
    pub item_serial: String,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub calibration_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub return_date: Option<NaiveDateTime>,
    pub document_number: Option<String>,
    pub version: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = status_logs)]
pub struct StatusLogRow {
    pub id: Uuid,
    pub kind: String,
    pub request_id: Uuid,
    pub status: String,
    pub actor_id: Uuid,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = item_histories)]
pub struct ItemHistoryRow {
    pub id: Uuid,
    pub item_serial: String,
    pub kind: String,
    pub request_id: Uuid,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub opening_note: Option<String>,
    pub closing_note: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = issued_documents)]
pub struct DocumentRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub doc_type: String,
    pub number: String,
    pub content: serde_json::Value,
    pub issued_at: NaiveDateTime,
    pub regenerated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = calibration_results)]
pub struct MeasurementRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub position: i32,
    pub parameter: String,
    pub reference_value: String,
    pub reading: String,
    pub unit: Option<String>,
    pub passed: Option<bool>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = report_parts)]
pub struct PartRow {
    pub id: Uuid,
    pub request_id: Uuid,
    pub doc_type: String,
    pub position: i32,
    pub part_name: String,
    pub quantity: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = reminders)]
#[diesel(treat_none_as_null = true)]
pub struct ReminderRow {
    pub id: Uuid,
    pub kind: String,
    pub owner_id: Uuid,
    pub related_request_id: Uuid,
    pub item_serial: String,
    pub due_date: NaiveDate,
    pub fire_date: NaiveDate,
    pub title: String,
    pub message: String,
    pub status: String,
    pub email_sent: bool,
    pub notified_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = notifications)]
pub struct NotificationRow {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub title: String,
    pub message: String,
    pub source: String,
    pub request_id: Option<Uuid>,
    pub reminder_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = activity_logs)]
pub struct ActivityRow {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub details: serde_json::Value,
    pub created_at: NaiveDateTime,
}

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role.as_str().to_string(),
            created_at: user.created_at,
        }
    }
}

impl TryFrom<UserRow> for User {
    type Error = CoreError;

    fn try_from(row: UserRow) -> CoreResult<Self> {
        Ok(Self {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            created_at: row.created_at,
        })
    }
}

impl From<&Item> for ItemRow {
    fn from(item: &Item) -> Self {
        Self {
            serial_number: item.serial_number.clone(),
            name: item.name.clone(),
            status: item.status.as_str().to_string(),
            last_verified_at: item.last_verified_at,
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = CoreError;

    fn try_from(row: ItemRow) -> CoreResult<Self> {
        Ok(Self {
            serial_number: row.serial_number,
            name: row.name,
            status: row.status.parse()?,
            last_verified_at: row.last_verified_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&ServiceRequest> for RequestRow {
    fn from(request: &ServiceRequest) -> Self {
        Self {
            id: request.id,
            kind: request.kind.as_str().to_string(),
            status: request.status.as_str().to_string(),
            owner_id: request.owner_id,
            item_serial: request.item_serial.clone(),
            notes: request.notes.clone(),
            start_date: request.start_date,
            due_date: request.due_date,
            calibration_date: request.calibration_date,
            valid_until: request.valid_until,
            return_date: request.return_date,
            document_number: request.document_number.clone(),
            version: request.version,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

impl TryFrom<RequestRow> for ServiceRequest {
    type Error = CoreError;

    fn try_from(row: RequestRow) -> CoreResult<Self> {
        Ok(Self {
            id: row.id,
            kind: row.kind.parse()?,
            status: row.status.parse()?,
            owner_id: row.owner_id,
            item_serial: row.item_serial,
            notes: row.notes,
            start_date: row.start_date,
            due_date: row.due_date,
            calibration_date: row.calibration_date,
            valid_until: row.valid_until,
            return_date: row.return_date,
            document_number: row.document_number,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&StatusLogEntry> for StatusLogRow {
    fn from(entry: &StatusLogEntry) -> Self {
        Self {
            id: entry.id,
            kind: entry.kind.as_str().to_string(),
            request_id: entry.request_id,
            status: entry.status.as_str().to_string(),
            actor_id: entry.actor_id,
            notes: entry.notes.clone(),
            created_at: entry.created_at,
        }
    }
}

impl TryFrom<StatusLogRow> for StatusLogEntry {
    type Error = CoreError;

    fn try_from(row: StatusLogRow) -> CoreResult<Self> {
        Ok(Self {
            id: row.id,
            kind: row.kind.parse()?,
            request_id: row.request_id,
            status: row.status.parse()?,
            actor_id: row.actor_id,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

impl From<&ItemHistory> for ItemHistoryRow {
    fn from(history: &ItemHistory) -> Self {
        Self {
            id: history.id,
            item_serial: history.item_serial.clone(),
            kind: history.kind.as_str().to_string(),
            request_id: history.request_id,
            started_at: history.started_at,
            ended_at: history.ended_at,
            opening_note: history.opening_note.clone(),
            closing_note: history.closing_note.clone(),
        }
    }
}

impl TryFrom<ItemHistoryRow> for ItemHistory {
    type Error = CoreError;

    fn try_from(row: ItemHistoryRow) -> CoreResult<Self> {
        Ok(Self {
            id: row.id,
            item_serial: row.item_serial,
            kind: row.kind.parse()?,
            request_id: row.request_id,
            started_at: row.started_at,
            ended_at: row.ended_at,
            opening_note: row.opening_note,
            closing_note: row.closing_note,
        })
    }
}

impl From<&IssuedDocument> for DocumentRow {
    fn from(document: &IssuedDocument) -> Self {
        Self {
            id: document.id,
            request_id: document.request_id,
            doc_type: document.doc_type.as_str().to_string(),
            number: document.number.clone(),
            content: document.content.clone(),
            issued_at: document.issued_at,
            regenerated_at: document.regenerated_at,
        }
    }
}

impl TryFrom<DocumentRow> for IssuedDocument {
    type Error = CoreError;

    fn try_from(row: DocumentRow) -> CoreResult<Self> {
        Ok(Self {
            id: row.id,
            request_id: row.request_id,
            doc_type: row.doc_type.parse()?,
            number: row.number,
            content: row.content,
            issued_at: row.issued_at,
            regenerated_at: row.regenerated_at,
        })
    }
}

impl From<MeasurementRow> for Measurement {
    fn from(row: MeasurementRow) -> Self {
        Self {
            parameter: row.parameter,
            reference_value: row.reference_value,
            reading: row.reading,
            unit: row.unit,
            passed: row.passed,
        }
    }
}

impl From<PartRow> for PartLine {
    fn from(row: PartRow) -> Self {
        Self {
            part_name: row.part_name,
            quantity: row.quantity,
            notes: row.notes,
        }
    }
}

impl From<&Reminder> for ReminderRow {
    fn from(reminder: &Reminder) -> Self {
        Self {
            id: reminder.id,
            kind: reminder.kind.as_str().to_string(),
            owner_id: reminder.owner_id,
            related_request_id: reminder.related_request_id,
            item_serial: reminder.item_serial.clone(),
            due_date: reminder.due_date,
            fire_date: reminder.fire_date,
            title: reminder.title.clone(),
            message: reminder.message.clone(),
            status: reminder.status.as_str().to_string(),
            email_sent: reminder.email_sent,
            notified_at: reminder.notified_at,
            created_at: reminder.created_at,
        }
    }
}

impl TryFrom<ReminderRow> for Reminder {
    type Error = CoreError;

    fn try_from(row: ReminderRow) -> CoreResult<Self> {
        Ok(Self {
            id: row.id,
            kind: row.kind.parse()?,
            owner_id: row.owner_id,
            related_request_id: row.related_request_id,
            item_serial: row.item_serial,
            due_date: row.due_date,
            fire_date: row.fire_date,
            title: row.title,
            message: row.message,
            status: row.status.parse()?,
            email_sent: row.email_sent,
            notified_at: row.notified_at,
            created_at: row.created_at,
        })
    }
}

impl From<&Notification> for NotificationRow {
    fn from(notification: &Notification) -> Self {
        Self {
            id: notification.id,
            recipient_id: notification.recipient_id,
            title: notification.title.clone(),
            message: notification.message.clone(),
            source: notification.source.as_str().to_string(),
            request_id: notification.request_id,
            reminder_id: notification.reminder_id,
            is_read: notification.is_read,
            created_at: notification.created_at,
        }
    }
}

impl TryFrom<NotificationRow> for Notification {
    type Error = CoreError;

    fn try_from(row: NotificationRow) -> CoreResult<Self> {
        Ok(Self {
            id: row.id,
            recipient_id: row.recipient_id,
            title: row.title,
            message: row.message,
            source: row.source.parse()?,
            request_id: row.request_id,
            reminder_id: row.reminder_id,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

impl From<&ActivityEntry> for ActivityRow {
    fn from(entry: &ActivityEntry) -> Self {
        Self {
            id: entry.id,
            actor_id: entry.actor_id,
            action: entry.action.clone(),
            entity: entry.entity.clone(),
            entity_id: entry.entity_id.clone(),
            details: entry.details.clone(),
            created_at: entry.created_at,
        }
    }
}

impl From<ActivityRow> for ActivityEntry {
    fn from(row: ActivityRow) -> Self {
        Self {
            id: row.id,
            actor_id: row.actor_id,
            action: row.action,
            entity: row.entity,
            entity_id: row.entity_id,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

/// Converts a batch of loaded rows, failing on the first unparseable status.
pub fn convert_rows<R, T>(rows: Vec<R>) -> CoreResult<Vec<T>>
where
    T: TryFrom<R, Error = CoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}
