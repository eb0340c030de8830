//! services/api/src/web/middleware.rs
//!
//! Identity middleware for the learner-facing routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::web::protocol::ErrorResponse;
use crate::web::rest::engine_failure;
use crate::web::state::AppState;

/// The header the authentication collaborator fills with the caller's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Middleware that reads the caller's id and makes sure their account exists.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// If missing or malformed, returns 401 Unauthorized.
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    // 1. Extract and parse the header
    let user_id = match req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
    {
        Some(user_id) => user_id,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "unauthenticated",
                    format!("a valid {} header is required", USER_ID_HEADER),
                )),
            )
                .into_response()
        }
    };

    // 2. First sight of a learner creates their account
    if let Err(e) = state.engine.ensure_account(user_id).await {
        return engine_failure(e).into_response();
    }

    // 3. Insert user_id into request extensions and continue
    req.extensions_mut().insert(user_id);
    next.run(req).await
}
