pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_identity;
pub use state::AppState;

/// Builds the API router. CORS, tracing and the Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Routes that act on behalf of a learner
    let learner_routes = Router::new()
        .route("/curriculum", get(rest::curriculum_handler))
        .route("/lessons/{id}", get(rest::lesson_handler))
        .route("/progress", get(rest::progress_handler))
        .route("/lessons/{id}/start", post(rest::start_session_handler))
        .route("/lessons/{id}/submit", post(rest::submit_session_handler))
        .route("/mistakes", get(rest::list_mistakes_handler))
        .route("/mistakes/{id}/master", post(rest::master_mistake_handler))
        .route("/shop/purchase", post(rest::purchase_handler))
        .route(
            "/users/me",
            get(rest::get_profile_handler).put(rest::update_profile_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_identity,
        ));

    // Public routes
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/shop/items", get(rest::list_items_handler))
        .route("/leaderboard", get(rest::leaderboard_handler));

    Router::new()
        .merge(public_routes)
        .merge(learner_routes)
        .with_state(app_state)
}
