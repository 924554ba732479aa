//! Status logs and item-history intervals.
//!
//! Status logs are append-only. History rows are opened when a request starts
//! holding an item and closed in the same transaction as the terminal
//! transition; both steps abort the transaction on failure.

use chrono::NaiveDateTime;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{ActivityEntry, ItemHistory, ServiceRequest, StatusLogEntry};
use crate::error::{CoreError, CoreResult};
use crate::store::Tx;

pub fn record_status(
    tx: &mut dyn Tx,
    request: &ServiceRequest,
    actor_id: Uuid,
    notes: Option<&str>,
    at: NaiveDateTime,
) -> CoreResult<StatusLogEntry> {
    let entry = StatusLogEntry {
        id: Uuid::new_v4(),
        kind: request.kind,
        request_id: request.id,
        status: request.status,
        actor_id,
        notes: notes.map(str::to_string),
        created_at: at,
    };
    tx.append_status_log(&entry)?;
    Ok(entry)
}

/// The open interval for `serial`, if any request currently holds it.
pub fn current_holder(tx: &mut dyn Tx, serial: &str) -> CoreResult<Option<ItemHistory>> {
    let mut open = tx.open_histories(serial)?;
    match open.len() {
        0 => Ok(None),
        1 => Ok(open.pop()),
        count => Err(CoreError::storage(format!(
            "item {serial} has {count} open history rows"
        ))),
    }
}

pub fn open_history(
    tx: &mut dyn Tx,
    request: &ServiceRequest,
    note: Option<&str>,
    at: NaiveDateTime,
) -> CoreResult<ItemHistory> {
    if let Some(holder) = current_holder(tx, &request.item_serial)? {
        return Err(CoreError::conflict(format!(
            "item {} is already held by {} request {}",
            request.item_serial, holder.kind, holder.request_id
        )));
    }
    let row = ItemHistory {
        id: Uuid::new_v4(),
        item_serial: request.item_serial.clone(),
        kind: request.kind,
        request_id: request.id,
        started_at: at,
        ended_at: None,
        opening_note: note.map(str::to_string),
        closing_note: None,
    };
    tx.insert_history(&row)?;
    Ok(row)
}

/// Closes the open row belonging to `request`. Returns `None` when the request
/// never held the item.
pub fn close_history(
    tx: &mut dyn Tx,
    request: &ServiceRequest,
    note: Option<&str>,
    at: NaiveDateTime,
) -> CoreResult<Option<ItemHistory>> {
    let Some(mut row) = tx
        .open_histories(&request.item_serial)?
        .into_iter()
        .find(|row| row.request_id == request.id && row.kind == request.kind)
    else {
        return Ok(None);
    };
    if !tx.close_history(row.id, at, note)? {
        return Err(CoreError::conflict(format!(
            "history row {} was closed concurrently",
            row.id
        )));
    }
    row.ended_at = Some(at);
    row.closing_note = note.map(str::to_string);
    Ok(Some(row))
}

pub fn activity(
    actor_id: Uuid,
    action: &str,
    entity: &str,
    entity_id: impl ToString,
    details: Value,
    at: NaiveDateTime,
) -> ActivityEntry {
    ActivityEntry {
        id: Uuid::new_v4(),
        actor_id,
        action: action.to_string(),
        entity: entity.to_string(),
        entity_id: entity_id.to_string(),
        details,
        created_at: at,
    }
}
