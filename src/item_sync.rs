//! Keeps an item's status consistent with the one request that holds it.
//!
//! [`item_effect`] is a pure mapping from a workflow transition to what must
//! happen to the item; [`apply_effect`] performs it inside the caller's
//! transaction with a compare-and-swap on the item status and the matching
//! history open/close.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::audit;
use crate::domain::{Item, ItemStatus, RequestStatus, ServiceRequest, WorkflowKind};
use crate::error::{CoreError, CoreResult};
use crate::store::Tx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemEffect {
    Unchanged,
    /// The request starts holding the item, which moves to the given status.
    Engage(ItemStatus),
    /// The request stops holding the item, which becomes available again.
    Release,
}

pub fn engaged_status(kind: WorkflowKind) -> ItemStatus {
    match kind {
        WorkflowKind::Calibration => ItemStatus::InCalibration,
        WorkflowKind::Rental => ItemStatus::Rented,
        WorkflowKind::Maintenance => ItemStatus::Maintenance,
    }
}

/// Effect of creating a request in `status`. Maintenance holds the item from
/// the moment it is opened.
pub fn entry_effect(kind: WorkflowKind, status: RequestStatus) -> ItemEffect {
    match kind {
        WorkflowKind::Maintenance if !status.is_terminal() => {
            ItemEffect::Engage(engaged_status(kind))
        }
        _ => ItemEffect::Unchanged,
    }
}

pub fn item_effect(kind: WorkflowKind, from: RequestStatus, to: RequestStatus) -> ItemEffect {
    if to.is_terminal() {
        return ItemEffect::Release;
    }
    match (kind, from, to) {
        (WorkflowKind::Calibration, RequestStatus::Pending, RequestStatus::Approved)
        | (WorkflowKind::Rental, RequestStatus::Pending, RequestStatus::Approved) => {
            ItemEffect::Engage(engaged_status(kind))
        }
        _ => ItemEffect::Unchanged,
    }
}

fn engageable_from(kind: WorkflowKind, status: ItemStatus) -> bool {
    match kind {
        WorkflowKind::Maintenance => {
            matches!(status, ItemStatus::Available | ItemStatus::Damaged)
        }
        WorkflowKind::Calibration | WorkflowKind::Rental => status == ItemStatus::Available,
    }
}

fn load_item(tx: &mut dyn Tx, serial: &str) -> CoreResult<Item> {
    tx.find_item(serial)?
        .ok_or_else(|| CoreError::not_found(format!("item {serial}")))
}

/// Applies `effect` for `request` (already carrying its new status).
pub fn apply_effect(
    tx: &mut dyn Tx,
    request: &ServiceRequest,
    effect: ItemEffect,
    note: Option<&str>,
    at: NaiveDateTime,
) -> CoreResult<Option<ItemStatus>> {
    match effect {
        ItemEffect::Unchanged => Ok(None),
        ItemEffect::Engage(next) => {
            let item = load_item(tx, &request.item_serial)?;
            if let Some(holder) = audit::current_holder(tx, &item.serial_number)? {
                if holder.request_id != request.id {
                    return Err(CoreError::conflict(format!(
                        "item {} is engaged by {} request {}",
                        item.serial_number, holder.kind, holder.request_id
                    )));
                }
            }
            if !engageable_from(request.kind, item.status) {
                return Err(CoreError::conflict(format!(
                    "item {} is {} and cannot enter {}",
                    item.serial_number, item.status, next
                )));
            }
            if !tx.swap_item_status(&item.serial_number, item.status, next, None, at)? {
                return Err(CoreError::conflict(format!(
                    "item {} changed status concurrently",
                    item.serial_number
                )));
            }
            audit::open_history(tx, request, note, at)?;
            debug!(item = %item.serial_number, from = %item.status, to = %next, "item engaged");
            Ok(Some(next))
        }
        ItemEffect::Release => {
            if audit::close_history(tx, request, note, at)?.is_none() {
                return Ok(None);
            }
            let held = engaged_status(request.kind);
            let verified_at = (request.kind == WorkflowKind::Calibration
                && request.status == RequestStatus::Completed)
                .then_some(at);
            if !tx.swap_item_status(
                &request.item_serial,
                held,
                ItemStatus::Available,
                verified_at,
                at,
            )? {
                return Err(CoreError::conflict(format!(
                    "item {} is no longer {}",
                    request.item_serial, held
                )));
            }
            debug!(item = %request.item_serial, from = %held, "item released");
            Ok(Some(ItemStatus::Available))
        }
    }
}

/// Administrative status change (e.g. marking an item damaged). Only allowed
/// while no request holds the item.
pub fn set_idle_status(
    tx: &mut dyn Tx,
    serial: &str,
    next: ItemStatus,
    at: NaiveDateTime,
) -> CoreResult<Item> {
    if !matches!(next, ItemStatus::Available | ItemStatus::Damaged) {
        return Err(CoreError::validation(format!(
            "{next} can only be set through a workflow"
        )));
    }
    let item = load_item(tx, serial)?;
    if let Some(holder) = audit::current_holder(tx, serial)? {
        return Err(CoreError::conflict(format!(
            "item {serial} is held by {} request {}",
            holder.kind, holder.request_id
        )));
    }
    if !tx.swap_item_status(serial, item.status, next, None, at)? {
        return Err(CoreError::conflict(format!(
            "item {serial} changed status concurrently"
        )));
    }
    load_item(tx, serial)
}
