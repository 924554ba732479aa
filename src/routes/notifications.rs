use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser, domain::Notification, error::AppResult, state::AppState,
};

pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Notification>>> {
    let actor = user.actor();
    let rows = state
        .run(move |engine| engine.notifications(Some(&actor)))
        .await?;
    Ok(Json(rows))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Notification>> {
    let actor = user.actor();
    let notification = state
        .run(move |engine| engine.mark_notification_read(Some(&actor), id))
        .await?;
    Ok(Json(notification))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let actor = user.actor();
    state
        .run(move |engine| engine.delete_notification(Some(&actor), id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
