use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    domain::{DocumentType, IssuedDocument, ServiceRequest, WorkflowKind},
    error::AppResult,
    lifecycle::{NewRequest, PurgeReport, RequestDetail, TransitionCommand, TransitionOutcome},
    state::AppState,
};

#[derive(Deserialize)]
pub struct RegeneratePayload {
    pub doc_type: DocumentType,
    #[serde(default)]
    pub recreate: bool,
}

pub async fn create_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(kind): Path<WorkflowKind>,
    Json(payload): Json<NewRequest>,
) -> AppResult<(StatusCode, Json<ServiceRequest>)> {
    let actor = user.actor();
    let request = state
        .run(move |engine| engine.create_request(Some(&actor), kind, payload))
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((kind, id)): Path<(WorkflowKind, Uuid)>,
) -> AppResult<Json<RequestDetail>> {
    let actor = user.actor();
    let detail = state
        .run(move |engine| engine.request_detail(Some(&actor), kind, id))
        .await?;
    Ok(Json(detail))
}

pub async fn transition_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((kind, id)): Path<(WorkflowKind, Uuid)>,
    Json(command): Json<TransitionCommand>,
) -> AppResult<Json<TransitionOutcome>> {
    let actor = user.actor();
    let outcome = state
        .run(move |engine| engine.transition(Some(&actor), kind, id, command))
        .await?;
    if !outcome.effect_failures.is_empty() {
        warn!(
            request_id = %id,
            failures = outcome.effect_failures.len(),
            "transition committed with failed side effects"
        );
    }
    Ok(Json(outcome))
}

pub async fn regenerate_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((kind, id)): Path<(WorkflowKind, Uuid)>,
    Json(payload): Json<RegeneratePayload>,
) -> AppResult<Json<IssuedDocument>> {
    let actor = user.actor();
    let document = state
        .run(move |engine| {
            engine.regenerate_document(Some(&actor), kind, id, payload.doc_type, payload.recreate)
        })
        .await?;
    Ok(Json(document))
}

pub async fn purge_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((kind, id)): Path<(WorkflowKind, Uuid)>,
) -> AppResult<Json<PurgeReport>> {
    let actor = user.actor();
    let report = state
        .run(move |engine| engine.purge_request(Some(&actor), kind, id))
        .await?;
    Ok(Json(report))
}
