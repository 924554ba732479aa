use axum::{extract::State, Json};

use crate::{
    auth::AuthenticatedUser, effects::EffectFailure, error::AppResult, state::AppState,
};

/// Side effects (activity rows, broadcasts) that failed after their request
/// committed.
pub async fn effect_failures(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<EffectFailure>>> {
    let actor = user.actor();
    let failures = state
        .run(move |engine| engine.effect_failures(Some(&actor)))
        .await?;
    Ok(Json(failures))
}
