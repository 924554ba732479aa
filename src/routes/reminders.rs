use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser, domain::Reminder, error::AppResult, state::AppState,
};

/// Due reminders of the caller. Polled by clients; first sight of a reminder
/// creates its inbox entry.
pub async fn due_reminders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Reminder>>> {
    let actor = user.actor();
    let reminders = state
        .run(move |engine| engine.due_reminders(Some(&actor)))
        .await?;
    Ok(Json(reminders))
}

pub async fn dismiss_reminder(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Reminder>> {
    let actor = user.actor();
    let reminder = state
        .run(move |engine| engine.dismiss_reminder(Some(&actor), id))
        .await?;
    Ok(Json(reminder))
}
