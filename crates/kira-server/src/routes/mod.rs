//! Route modules and the top-level router assembly.

mod auth;
mod boards;
mod cards;
mod events;
mod tasks;
mod workers;

pub use auth::user_id_for_username;

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthLayer;
use crate::state::ApiState;

/// Build the full HTTP/WS router: `/auth/login` is the only route that does
/// not require a bearer token, so it lives on its own unlayered sub-router
/// merged alongside everything else behind [`AuthLayer`].
pub fn build_router(state: Arc<ApiState>) -> Router {
    let public = Router::new().route("/auth/login", post(auth::login));

    let protected = Router::new()
        .route("/workers/register", post(workers::register))
        .route("/workers/heartbeat", post(workers::heartbeat))
        .route("/workers/tasks/poll", get(tasks::poll))
        .route("/workers/tasks/{id}/claim", post(tasks::claim))
        .route("/workers/tasks/{id}/progress", post(tasks::progress))
        .route("/workers/tasks/{id}/complete", post(tasks::complete))
        .route("/workers/tasks/{id}/fail", post(tasks::fail))
        .route("/boards/{id}/settings", get(boards::get_settings))
        .route("/boards/{id}", patch(boards::update_board))
        .route("/boards/{id}/columns", post(boards::create_column))
        .route("/columns/{id}", patch(boards::update_column))
        .route("/cards", post(cards::create_card))
        .route("/cards/{id}/move", post(cards::move_card))
        .route("/events/ws", get(events::events_ws))
        .layer(AuthLayer::new(state.tokens.clone()));

    let allowed_origins = state.allowed_origins.clone();

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(
                    move |origin: &axum::http::HeaderValue, _parts: &axum::http::request::Parts| {
                        let Ok(origin_str) = origin.to_str() else {
                            return false;
                        };
                        origin_str.starts_with("http://localhost")
                            || origin_str.starts_with("http://127.0.0.1")
                            || origin_str.starts_with("https://localhost")
                            || origin_str.starts_with("https://127.0.0.1")
                            || allowed_origins.iter().any(|allowed| origin_str == allowed)
                    },
                ))
                .allow_methods([Method::GET, Method::POST, Method::PATCH])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                ])
                .allow_credentials(true),
        )
        .with_state(state)
}
