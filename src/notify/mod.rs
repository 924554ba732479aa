//! Notification dispatcher.
//!
//! Inbox rows are created for the owner of a request when someone else moves
//! it, and once per reminder when its fire date has passed. Admin broadcasts
//! are queued as [`Effect`]s and never affect the primary transaction.
//! Delivery over e-mail or webhooks goes through a [`NotificationChannel`].

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    Actor, Notification, NotificationSource, Reminder, Role, ServiceRequest,
};
use crate::effects::Effect;
use crate::error::{CoreError, CoreResult};
use crate::store::Tx;

pub mod webhook;

pub use webhook::{LoggingChannel, WebhookChannel};

pub fn notification(
    recipient_id: Uuid,
    title: &str,
    message: &str,
    source: NotificationSource,
    request_id: Option<Uuid>,
    reminder_id: Option<Uuid>,
    at: NaiveDateTime,
) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        recipient_id,
        title: title.to_string(),
        message: message.to_string(),
        source,
        request_id,
        reminder_id,
        is_read: false,
        created_at: at,
    }
}

fn transition_text(request: &ServiceRequest) -> (String, String) {
    let kind = request.kind.as_str();
    (
        format!("{kind} request {}", request.status),
        format!(
            "The {kind} request for item {} is now {}.",
            request.item_serial, request.status
        ),
    )
}

/// Inbox entry for the owner of `request`, unless the owner made the change.
pub fn notify_owner(
    tx: &mut dyn Tx,
    request: &ServiceRequest,
    actor: &Actor,
    at: NaiveDateTime,
) -> CoreResult<Option<Notification>> {
    if request.owner_id == actor.id {
        return Ok(None);
    }
    let (title, message) = transition_text(request);
    let notification = notification(
        request.owner_id,
        &title,
        &message,
        NotificationSource::Transition,
        Some(request.id),
        None,
        at,
    );
    tx.insert_notification(&notification)?;
    Ok(Some(notification))
}

/// Broadcast to the other admins when an admin moves a request.
pub fn admin_broadcast(request: &ServiceRequest, actor: &Actor) -> Option<Effect> {
    if !actor.is_admin() {
        return None;
    }
    let (title, message) = transition_text(request);
    Some(Effect::Broadcast {
        role: Role::Admin,
        exclude: Some(actor.id),
        title,
        message,
        request_id: Some(request.id),
    })
}

/// Announces a new request to every role that can act on it.
pub fn creation_broadcasts(request: &ServiceRequest, actor: &Actor) -> Vec<Effect> {
    let title = format!("New {} request", request.kind);
    let message = format!(
        "A {} request was opened for item {}.",
        request.kind, request.item_serial
    );
    request
        .kind
        .authorizing_roles()
        .iter()
        .map(|role| Effect::Broadcast {
            role: *role,
            exclude: Some(actor.id),
            title: title.clone(),
            message: message.clone(),
            request_id: Some(request.id),
        })
        .collect()
}

/// Returns the pending reminders of `owner` that are due on `today`, creating
/// the inbox entry for each one the first time it is seen.
pub fn dispatch_due(
    tx: &mut dyn Tx,
    today: NaiveDate,
    owner: Option<Uuid>,
    now: NaiveDateTime,
) -> CoreResult<Vec<Reminder>> {
    let mut due = tx.due_reminders(today, owner)?;
    for reminder in due.iter_mut().filter(|r| r.notified_at.is_none()) {
        let entry = notification(
            reminder.owner_id,
            &reminder.title,
            &reminder.message,
            NotificationSource::Reminder,
            Some(reminder.related_request_id),
            Some(reminder.id),
            now,
        );
        tx.insert_notification(&entry)?;
        reminder.notified_at = Some(now);
        tx.update_reminder(reminder)?;
        debug!(reminder_id = %reminder.id, owner_id = %reminder.owner_id, "reminder notified");
    }
    Ok(due)
}

pub fn inbox(tx: &mut dyn Tx, actor: &Actor) -> CoreResult<Vec<Notification>> {
    tx.notifications_for(actor.id)
}

fn owned_notification(tx: &mut dyn Tx, actor: &Actor, id: Uuid) -> CoreResult<Notification> {
    let found = tx
        .find_notification(id)?
        .ok_or_else(|| CoreError::not_found(format!("notification {id}")))?;
    if found.recipient_id != actor.id {
        return Err(CoreError::forbidden("notification belongs to another user"));
    }
    Ok(found)
}

pub fn mark_read(tx: &mut dyn Tx, actor: &Actor, id: Uuid) -> CoreResult<Notification> {
    let mut found = owned_notification(tx, actor, id)?;
    if !found.is_read {
        tx.mark_notification_read(id)?;
        found.is_read = true;
    }
    Ok(found)
}

pub fn delete(tx: &mut dyn Tx, actor: &Actor, id: Uuid) -> CoreResult<()> {
    owned_notification(tx, actor, id)?;
    tx.delete_notification(id)?;
    Ok(())
}

/// Fully formatted message handed to a delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub reminder_id: Uuid,
    pub recipient_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Due reminders that have not been sent over the outbound channel yet.
pub fn pending_outbound(tx: &mut dyn Tx, today: NaiveDate) -> CoreResult<Vec<OutboundMessage>> {
    let mut messages = Vec::new();
    for reminder in tx.due_reminders(today, None)? {
        if reminder.email_sent {
            continue;
        }
        let recipient = tx
            .find_user(reminder.owner_id)?
            .map(|user| user.username)
            .unwrap_or_else(|| reminder.owner_id.to_string());
        messages.push(OutboundMessage {
            reminder_id: reminder.id,
            recipient_id: reminder.owner_id,
            recipient,
            subject: reminder.title.clone(),
            body: format!("{}\n\nDue date: {}", reminder.message, reminder.due_date),
        });
    }
    Ok(messages)
}

pub fn mark_email_sent(tx: &mut dyn Tx, reminder_id: Uuid) -> CoreResult<()> {
    let mut reminder = tx
        .find_reminder(reminder_id)?
        .ok_or_else(|| CoreError::not_found(format!("reminder {reminder_id}")))?;
    if !reminder.email_sent {
        reminder.email_sent = true;
        tx.update_reminder(&reminder)?;
        info!(reminder_id = %reminder_id, "reminder delivered");
    }
    Ok(())
}

/// Transport for outbound messages (e-mail relay, push, webhook).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()>;
}
