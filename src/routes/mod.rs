use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod admin;
pub mod auth;
pub mod health;
pub mod items;
pub mod notifications;
pub mod reminders;
pub mod requests;

fn cors_layer(state: &AppState) -> CorsLayer {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = %value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(&state);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let items_routes = Router::new()
        .route("/", post(items::register_item))
        .route("/:serial", get(items::get_item))
        .route("/:serial/history", get(items::item_history))
        .route("/:serial/status", patch(items::set_item_status));

    let requests_routes = Router::new()
        .route("/:kind", post(requests::create_request))
        .route(
            "/:kind/:id",
            get(requests::get_request).delete(requests::purge_request),
        )
        .route("/:kind/:id/transition", post(requests::transition_request))
        .route("/:kind/:id/document", post(requests::regenerate_document));

    let reminders_routes = Router::new()
        .route("/due", get(reminders::due_reminders))
        .route("/:id/dismiss", post(reminders::dismiss_reminder));

    let notifications_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/:id", delete(notifications::delete_notification))
        .route("/:id/read", post(notifications::mark_read));

    let admin_routes = Router::new().route("/effect-failures", get(admin::effect_failures));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/items", items_routes)
        .nest("/api/requests", requests_routes)
        .nest("/api/reminders", reminders_routes)
        .nest("/api/notifications", notifications_routes)
        .nest("/api/admin", admin_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
