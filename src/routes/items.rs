use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    auth::AuthenticatedUser,
    domain::{Item, ItemHistory, ItemStatus},
    error::AppResult,
    lifecycle::{ItemView, NewItem},
    state::AppState,
};

#[derive(Deserialize)]
pub struct StatusPayload {
    pub status: ItemStatus,
}

pub async fn register_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<NewItem>,
) -> AppResult<(StatusCode, Json<Item>)> {
    let actor = user.actor();
    let item = state
        .run(move |engine| engine.register_item(Some(&actor), payload))
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(serial): Path<String>,
) -> AppResult<Json<ItemView>> {
    let actor = user.actor();
    let view = state
        .run(move |engine| engine.item(Some(&actor), &serial))
        .await?;
    Ok(Json(view))
}

pub async fn item_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(serial): Path<String>,
) -> AppResult<Json<Vec<ItemHistory>>> {
    let actor = user.actor();
    let rows = state
        .run(move |engine| engine.item_history(Some(&actor), &serial))
        .await?;
    Ok(Json(rows))
}

pub async fn set_item_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(serial): Path<String>,
    Json(payload): Json<StatusPayload>,
) -> AppResult<Json<Item>> {
    let actor = user.actor();
    let item = state
        .run(move |engine| engine.set_item_status(Some(&actor), &serial, payload.status))
        .await?;
    Ok(Json(item))
}
