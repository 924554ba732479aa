use chrono::{NaiveDate, NaiveDateTime};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::db::PgPool;
use crate::domain::{
    ActivityEntry, DocumentType, IssuedDocument, Item, ItemHistory, ItemStatus, Measurement,
    Notification, PartLine, Reminder, ReminderKind, ReminderStatus, Role,
    ServiceRequest, StatusLogEntry, User, WorkflowKind,
};
use crate::error::{CoreError, CoreResult};
use crate::models::{
    convert_rows, ActivityRow, DocumentRow, ItemHistoryRow, ItemRow, MeasurementRow,
    NotificationRow, PartRow, ReminderRow, RequestRow, StatusLogRow, UserRow,
};
use crate::schema::{
    activity_logs, calibration_results, document_sequences, issued_documents, item_histories,
    items, notifications, reminders, report_parts, service_requests, status_logs, users,
};
use crate::store::{Store, Tx, TxWork};

/// PostgreSQL store backed by an r2d2 pool. Each transaction checks out one
/// connection and runs inside `BEGIN ... COMMIT`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Store for PgStore {
    fn transaction(&self, work: TxWork<'_>) -> CoreResult<()> {
        let mut pooled = self.pool.get()?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<(), CoreError, _>(|conn| work(&mut PgTx { conn }))
    }
}

struct PgTx<'a> {
    conn: &'a mut PgConnection,
}

impl Tx for PgTx<'_> {
    fn insert_user(&mut self, user: &User) -> CoreResult<()> {
        diesel::insert_into(users::table)
            .values(&UserRow::from(user))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_user(&mut self, id: Uuid) -> CoreResult<Option<User>> {
        users::table
            .find(id)
            .first::<UserRow>(self.conn)
            .optional()?
            .map(User::try_from)
            .transpose()
    }

    fn find_user_by_username(&mut self, username: &str) -> CoreResult<Option<User>> {
        users::table
            .filter(users::username.eq(username))
            .first::<UserRow>(self.conn)
            .optional()?
            .map(User::try_from)
            .transpose()
    }

    fn user_ids_with_role(&mut self, role: Role) -> CoreResult<Vec<Uuid>> {
        Ok(users::table
            .filter(users::role.eq(role.as_str()))
            .select(users::id)
            .load(self.conn)?)
    }

    fn insert_item(&mut self, item: &Item) -> CoreResult<()> {
        diesel::insert_into(items::table)
            .values(&ItemRow::from(item))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_item(&mut self, serial: &str) -> CoreResult<Option<Item>> {
        items::table
            .find(serial)
            .first::<ItemRow>(self.conn)
            .optional()?
            .map(Item::try_from)
            .transpose()
    }

    fn swap_item_status(
        &mut self,
        serial: &str,
        expected: ItemStatus,
        next: ItemStatus,
        verified_at: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> CoreResult<bool> {
        let target = items::table
            .filter(items::serial_number.eq(serial))
            .filter(items::status.eq(expected.as_str()));
        let updated = match verified_at {
            Some(verified_at) => diesel::update(target)
                .set((
                    items::status.eq(next.as_str()),
                    items::last_verified_at.eq(Some(verified_at)),
                    items::updated_at.eq(now),
                ))
                .execute(self.conn)?,
            None => diesel::update(target)
                .set((items::status.eq(next.as_str()), items::updated_at.eq(now)))
                .execute(self.conn)?,
        };
        Ok(updated == 1)
    }

    fn insert_request(&mut self, request: &ServiceRequest) -> CoreResult<()> {
        diesel::insert_into(service_requests::table)
            .values(&RequestRow::from(request))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_request(
        &mut self,
        kind: WorkflowKind,
        id: Uuid,
    ) -> CoreResult<Option<ServiceRequest>> {
        service_requests::table
            .filter(service_requests::id.eq(id))
            .filter(service_requests::kind.eq(kind.as_str()))
            .first::<RequestRow>(self.conn)
            .optional()?
            .map(ServiceRequest::try_from)
            .transpose()
    }

    fn update_request(
        &mut self,
        request: &ServiceRequest,
        expected_version: i32,
    ) -> CoreResult<bool> {
        let updated = diesel::update(
            service_requests::table
                .filter(service_requests::id.eq(request.id))
                .filter(service_requests::version.eq(expected_version)),
        )
        .set(&RequestRow::from(request))
        .execute(self.conn)?;
        Ok(updated == 1)
    }

    fn delete_request(&mut self, kind: WorkflowKind, id: Uuid) -> CoreResult<bool> {
        let deleted = diesel::delete(
            service_requests::table
                .filter(service_requests::id.eq(id))
                .filter(service_requests::kind.eq(kind.as_str())),
        )
        .execute(self.conn)?;
        Ok(deleted > 0)
    }

    fn append_status_log(&mut self, entry: &StatusLogEntry) -> CoreResult<()> {
        diesel::insert_into(status_logs::table)
            .values(&StatusLogRow::from(entry))
            .execute(self.conn)?;
        Ok(())
    }

    fn status_logs(
        &mut self,
        kind: WorkflowKind,
        request_id: Uuid,
    ) -> CoreResult<Vec<StatusLogEntry>> {
        let rows: Vec<StatusLogRow> = status_logs::table
            .filter(status_logs::kind.eq(kind.as_str()))
            .filter(status_logs::request_id.eq(request_id))
            .order(status_logs::created_at.asc())
            .load(self.conn)?;
        convert_rows(rows)
    }

    fn delete_status_logs(&mut self, kind: WorkflowKind, request_id: Uuid) -> CoreResult<usize> {
        Ok(diesel::delete(
            status_logs::table
                .filter(status_logs::kind.eq(kind.as_str()))
                .filter(status_logs::request_id.eq(request_id)),
        )
        .execute(self.conn)?)
    }

    fn insert_history(&mut self, row: &ItemHistory) -> CoreResult<()> {
        diesel::insert_into(item_histories::table)
            .values(&ItemHistoryRow::from(row))
            .execute(self.conn)?;
        Ok(())
    }

    fn open_histories(&mut self, serial: &str) -> CoreResult<Vec<ItemHistory>> {
        let rows: Vec<ItemHistoryRow> = item_histories::table
            .filter(item_histories::item_serial.eq(serial))
            .filter(item_histories::ended_at.is_null())
            .for_update()
            .load(self.conn)?;
        convert_rows(rows)
    }

    fn close_history(
        &mut self,
        id: Uuid,
        ended_at: NaiveDateTime,
        closing_note: Option<&str>,
    ) -> CoreResult<bool> {
        let updated = diesel::update(
            item_histories::table
                .filter(item_histories::id.eq(id))
                .filter(item_histories::ended_at.is_null()),
        )
        .set((
            item_histories::ended_at.eq(Some(ended_at)),
            item_histories::closing_note.eq(closing_note),
        ))
        .execute(self.conn)?;
        Ok(updated == 1)
    }

    fn item_histories(&mut self, serial: &str) -> CoreResult<Vec<ItemHistory>> {
        let rows: Vec<ItemHistoryRow> = item_histories::table
            .filter(item_histories::item_serial.eq(serial))
            .order(item_histories::started_at.asc())
            .load(self.conn)?;
        convert_rows(rows)
    }

    fn delete_histories_for_request(
        &mut self,
        kind: WorkflowKind,
        request_id: Uuid,
    ) -> CoreResult<usize> {
        Ok(diesel::delete(
            item_histories::table
                .filter(item_histories::kind.eq(kind.as_str()))
                .filter(item_histories::request_id.eq(request_id)),
        )
        .execute(self.conn)?)
    }

    fn next_sequence(&mut self, doc_type: DocumentType, period: &str) -> CoreResult<i64> {
        let value = diesel::insert_into(document_sequences::table)
            .values((
                document_sequences::doc_type.eq(doc_type.as_str()),
                document_sequences::period.eq(period),
                document_sequences::last_value.eq(1_i64),
            ))
            .on_conflict((document_sequences::doc_type, document_sequences::period))
            .do_update()
            .set(document_sequences::last_value.eq(document_sequences::last_value + 1_i64))
            .returning(document_sequences::last_value)
            .get_result::<i64>(self.conn)?;
        Ok(value)
    }

    #[cfg(test)]
    fn count_documents(
        &mut self,
        doc_type: DocumentType,
        from: NaiveDateTime,
        until: NaiveDateTime,
    ) -> CoreResult<i64> {
        Ok(issued_documents::table
            .filter(issued_documents::doc_type.eq(doc_type.as_str()))
            .filter(issued_documents::issued_at.ge(from))
            .filter(issued_documents::issued_at.lt(until))
            .count()
            .get_result(self.conn)?)
    }

    fn insert_document(&mut self, document: &IssuedDocument) -> CoreResult<()> {
        diesel::insert_into(issued_documents::table)
            .values(&DocumentRow::from(document))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_document(
        &mut self,
        request_id: Uuid,
        doc_type: DocumentType,
    ) -> CoreResult<Option<IssuedDocument>> {
        issued_documents::table
            .filter(issued_documents::request_id.eq(request_id))
            .filter(issued_documents::doc_type.eq(doc_type.as_str()))
            .first::<DocumentRow>(self.conn)
            .optional()?
            .map(IssuedDocument::try_from)
            .transpose()
    }

    fn update_document_content(
        &mut self,
        id: Uuid,
        content: &Value,
        regenerated_at: NaiveDateTime,
    ) -> CoreResult<()> {
        let updated = diesel::update(issued_documents::table.find(id))
            .set((
                issued_documents::content.eq(content),
                issued_documents::regenerated_at.eq(Some(regenerated_at)),
            ))
            .execute(self.conn)?;
        if updated == 0 {
            return Err(CoreError::not_found(format!("document {id}")));
        }
        Ok(())
    }

    fn delete_document(&mut self, id: Uuid) -> CoreResult<bool> {
        Ok(diesel::delete(issued_documents::table.find(id)).execute(self.conn)? > 0)
    }

    fn documents_for_request(&mut self, request_id: Uuid) -> CoreResult<Vec<IssuedDocument>> {
        let rows: Vec<DocumentRow> = issued_documents::table
            .filter(issued_documents::request_id.eq(request_id))
            .order(issued_documents::issued_at.asc())
            .load(self.conn)?;
        convert_rows(rows)
    }

    fn replace_measurements(&mut self, request_id: Uuid, rows: &[Measurement]) -> CoreResult<()> {
        diesel::delete(
            calibration_results::table.filter(calibration_results::request_id.eq(request_id)),
        )
        .execute(self.conn)?;

        let new_rows: Vec<MeasurementRow> = rows
            .iter()
            .enumerate()
            .map(|(position, row)| MeasurementRow {
                id: Uuid::new_v4(),
                request_id,
                position: position as i32,
                parameter: row.parameter.clone(),
                reference_value: row.reference_value.clone(),
                reading: row.reading.clone(),
                unit: row.unit.clone(),
                passed: row.passed,
            })
            .collect();
        if !new_rows.is_empty() {
            diesel::insert_into(calibration_results::table)
                .values(&new_rows)
                .execute(self.conn)?;
        }
        Ok(())
    }

    fn measurements(&mut self, request_id: Uuid) -> CoreResult<Vec<Measurement>> {
        let rows: Vec<MeasurementRow> = calibration_results::table
            .filter(calibration_results::request_id.eq(request_id))
            .order(calibration_results::position.asc())
            .load(self.conn)?;
        Ok(rows.into_iter().map(Measurement::from).collect())
    }

    fn replace_parts(
        &mut self,
        request_id: Uuid,
        doc_type: DocumentType,
        rows: &[PartLine],
    ) -> CoreResult<()> {
        diesel::delete(
            report_parts::table
                .filter(report_parts::request_id.eq(request_id))
                .filter(report_parts::doc_type.eq(doc_type.as_str())),
        )
        .execute(self.conn)?;

        let new_rows: Vec<PartRow> = rows
            .iter()
            .enumerate()
            .map(|(position, row)| PartRow {
                id: Uuid::new_v4(),
                request_id,
                doc_type: doc_type.as_str().to_string(),
                position: position as i32,
                part_name: row.part_name.clone(),
                quantity: row.quantity,
                notes: row.notes.clone(),
            })
            .collect();
        if !new_rows.is_empty() {
            diesel::insert_into(report_parts::table)
                .values(&new_rows)
                .execute(self.conn)?;
        }
        Ok(())
    }

    fn parts(&mut self, request_id: Uuid, doc_type: DocumentType) -> CoreResult<Vec<PartLine>> {
        let rows: Vec<PartRow> = report_parts::table
            .filter(report_parts::request_id.eq(request_id))
            .filter(report_parts::doc_type.eq(doc_type.as_str()))
            .order(report_parts::position.asc())
            .load(self.conn)?;
        Ok(rows.into_iter().map(PartLine::from).collect())
    }

    fn insert_reminder(&mut self, reminder: &Reminder) -> CoreResult<()> {
        diesel::insert_into(reminders::table)
            .values(&ReminderRow::from(reminder))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_reminder(&mut self, id: Uuid) -> CoreResult<Option<Reminder>> {
        reminders::table
            .find(id)
            .first::<ReminderRow>(self.conn)
            .optional()?
            .map(Reminder::try_from)
            .transpose()
    }

    fn find_pending_reminder(
        &mut self,
        kind: ReminderKind,
        related_request_id: Uuid,
    ) -> CoreResult<Option<Reminder>> {
        reminders::table
            .filter(reminders::kind.eq(kind.as_str()))
            .filter(reminders::related_request_id.eq(related_request_id))
            .filter(reminders::status.eq(ReminderStatus::Pending.as_str()))
            .first::<ReminderRow>(self.conn)
            .optional()?
            .map(Reminder::try_from)
            .transpose()
    }

    fn due_reminders(
        &mut self,
        today: NaiveDate,
        owner: Option<Uuid>,
    ) -> CoreResult<Vec<Reminder>> {
        let mut query = reminders::table
            .filter(reminders::status.eq(ReminderStatus::Pending.as_str()))
            .filter(reminders::fire_date.le(today))
            .order(reminders::fire_date.asc())
            .into_boxed();
        if let Some(owner) = owner {
            query = query.filter(reminders::owner_id.eq(owner));
        }
        let rows: Vec<ReminderRow> = query.load(self.conn)?;
        convert_rows(rows)
    }

    fn reminders_for_request(&mut self, request_id: Uuid) -> CoreResult<Vec<Reminder>> {
        let rows: Vec<ReminderRow> = reminders::table
            .filter(reminders::related_request_id.eq(request_id))
            .order(reminders::created_at.asc())
            .load(self.conn)?;
        convert_rows(rows)
    }

    fn update_reminder(&mut self, reminder: &Reminder) -> CoreResult<()> {
        let updated = diesel::update(reminders::table.find(reminder.id))
            .set(&ReminderRow::from(reminder))
            .execute(self.conn)?;
        if updated == 0 {
            return Err(CoreError::not_found(format!("reminder {}", reminder.id)));
        }
        Ok(())
    }

    fn insert_notification(&mut self, notification: &Notification) -> CoreResult<()> {
        diesel::insert_into(notifications::table)
            .values(&NotificationRow::from(notification))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_notification(&mut self, id: Uuid) -> CoreResult<Option<Notification>> {
        notifications::table
            .find(id)
            .first::<NotificationRow>(self.conn)
            .optional()?
            .map(Notification::try_from)
            .transpose()
    }

    fn notifications_for(&mut self, recipient_id: Uuid) -> CoreResult<Vec<Notification>> {
        let rows: Vec<NotificationRow> = notifications::table
            .filter(notifications::recipient_id.eq(recipient_id))
            .order((notifications::is_read.asc(), notifications::created_at.desc()))
            .load(self.conn)?;
        convert_rows(rows)
    }

    fn mark_notification_read(&mut self, id: Uuid) -> CoreResult<bool> {
        let updated = diesel::update(notifications::table.find(id))
            .set(notifications::is_read.eq(true))
            .execute(self.conn)?;
        Ok(updated > 0)
    }

    fn delete_notification(&mut self, id: Uuid) -> CoreResult<bool> {
        Ok(diesel::delete(notifications::table.find(id)).execute(self.conn)? > 0)
    }

    fn insert_activity(&mut self, entry: &ActivityEntry) -> CoreResult<()> {
        diesel::insert_into(activity_logs::table)
            .values(&ActivityRow::from(entry))
            .execute(self.conn)?;
        Ok(())
    }

    fn activities_for(&mut self, entity: &str, entity_id: &str) -> CoreResult<Vec<ActivityEntry>> {
        let rows: Vec<ActivityRow> = activity_logs::table
            .filter(activity_logs::entity.eq(entity))
            .filter(activity_logs::entity_id.eq(entity_id))
            .order(activity_logs::created_at.asc())
            .load(self.conn)?;
        Ok(rows.into_iter().map(ActivityEntry::from).collect())
    }
}
