//! Transition tables and permission checks for the three workflow kinds.

use crate::domain::{Actor, RequestStatus, Role, ServiceRequest, WorkflowKind};
use crate::error::{CoreError, CoreResult};

use RequestStatus::*;

/// Statuses reachable in one step from `from`.
pub fn allowed_targets(kind: WorkflowKind, from: RequestStatus) -> &'static [RequestStatus] {
    match (kind, from) {
        (WorkflowKind::Calibration, Pending) => &[Approved, Rejected, Cancelled],
        (WorkflowKind::Calibration, Approved) => &[InProgress, Completed, Rejected, Cancelled],
        (WorkflowKind::Calibration, InProgress) => &[Completed],
        (WorkflowKind::Rental, Pending) => &[Approved, Rejected, Cancelled],
        (WorkflowKind::Rental, Approved) => &[Completed],
        (WorkflowKind::Maintenance, Pending) => &[InProgress, Completed, Cancelled],
        (WorkflowKind::Maintenance, InProgress) => &[Completed, Cancelled],
        _ => &[],
    }
}

pub fn check_transition(kind: WorkflowKind, from: RequestStatus, to: RequestStatus) -> CoreResult<()> {
    if allowed_targets(kind, from).contains(&to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition { kind, from, to })
    }
}

/// Status a new request starts in when opened by `actor`.
pub fn initial_status(kind: WorkflowKind, actor: &Actor) -> RequestStatus {
    match kind {
        WorkflowKind::Maintenance if kind.is_authorizer(actor.role) => InProgress,
        _ => Pending,
    }
}

/// Whether `actor` may read `request` at all.
pub fn can_view(actor: &Actor, request: &ServiceRequest) -> bool {
    actor.id == request.owner_id || actor.is_admin() || request.kind.is_authorizer(actor.role)
}

/// Permission check for moving `request` to `to`.
///
/// Anyone who is neither the owner nor an authorizer is rejected outright.
/// Owners may only withdraw their request or hand back a rented item; every
/// other decision belongs to an authorizer. The internal calibration step is
/// reserved for managers, with admins allowed to stand in.
pub fn authorize(actor: &Actor, request: &ServiceRequest, to: RequestStatus) -> CoreResult<()> {
    let kind = request.kind;
    let is_owner = actor.id == request.owner_id;
    let is_authorizer = kind.is_authorizer(actor.role);

    if kind == WorkflowKind::Calibration && to == InProgress {
        return match actor.role {
            Role::Manager | Role::Admin => Ok(()),
            Role::User => Err(CoreError::forbidden(
                "only managers can start calibration work",
            )),
        };
    }
    if !is_owner && !is_authorizer {
        return Err(CoreError::forbidden(format!(
            "not allowed to act on this {kind} request"
        )));
    }
    if is_authorizer {
        return Ok(());
    }

    let owner_may = match (kind, to) {
        (_, Cancelled) => request.status == Pending,
        (WorkflowKind::Rental, Completed) => true,
        _ => false,
    };
    if owner_may {
        Ok(())
    } else {
        Err(CoreError::forbidden(format!(
            "moving a {kind} request to {to} requires an authorizing role"
        )))
    }
}
