//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::protocol::{
    CorrectionResponse, EconomyResponse, ErrorResponse, HealthResponse, ItemEffectResponse,
    LeaderboardEntryResponse, LeaderboardQuery, LessonResponse, LessonSummaryResponse,
    LevelResponse, MistakeQuery, MistakeResponse, ProfileResponse, ProgressResponse,
    PurchaseRequest, PurchaseResponse, QuestionResponse, SessionResultResponse,
    SessionStartResponse, ShopItemResponse, SubmitSessionRequest, UpdateProfileRequest,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use englishquest_core::mistakes::MasteryFilter;
use englishquest_core::EngineError;
use std::sync::Arc;
use tracing::error;
use utoipa::OpenApi;
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        curriculum_handler,
        lesson_handler,
        progress_handler,
        start_session_handler,
        submit_session_handler,
        list_mistakes_handler,
        master_mistake_handler,
        list_items_handler,
        purchase_handler,
        leaderboard_handler,
        get_profile_handler,
        update_profile_handler,
    ),
    components(
        schemas(
            ErrorResponse, HealthResponse, EconomyResponse, ProfileResponse, UpdateProfileRequest,
            LevelResponse, LessonSummaryResponse, LessonResponse, QuestionResponse,
            ProgressResponse, SessionStartResponse, SubmitSessionRequest, SessionResultResponse,
            CorrectionResponse, MistakeResponse,
            ShopItemResponse, ItemEffectResponse, PurchaseRequest, PurchaseResponse,
            LeaderboardEntryResponse
        )
    ),
    tags(
        (name = "EnglishQuest API", description = "Progression, rewards and shop for language learners.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

type HandlerResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Maps an engine error onto its HTTP status and JSON body.
pub fn engine_failure(e: EngineError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        EngineError::Validation(_) => StatusCode::BAD_REQUEST,
        EngineError::AccessDenied(_) => StatusCode::FORBIDDEN,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        EngineError::ConflictRetryable(_) => StatusCode::CONFLICT,
        EngineError::AlreadyApplied(_) => StatusCode::CONFLICT,
        EngineError::StorageUnavailable(_) => {
            error!("Request failed in storage: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (status, Json(ErrorResponse::from(&e)))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Every level and lesson with the caller's unlock status.
#[utoipa::path(
    get,
    path = "/curriculum",
    responses(
        (status = 200, description = "The curriculum", body = [LevelResponse]),
        (status = 401, description = "Missing or invalid x-user-id", body = ErrorResponse)
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn curriculum_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HandlerResult<Vec<LevelResponse>> {
    let levels = app_state
        .engine
        .curriculum_for(user_id)
        .await
        .map_err(engine_failure)?;
    Ok(Json(levels.into_iter().map(Into::into).collect()))
}

/// A lesson and its questions. Correct answers are never included.
#[utoipa::path(
    get,
    path = "/lessons/{id}",
    responses(
        (status = 200, description = "The lesson", body = LessonResponse),
        (status = 404, description = "Unknown lesson", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Lesson id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn lesson_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(lesson_id): Path<i64>,
) -> HandlerResult<LessonResponse> {
    let lesson = app_state
        .engine
        .lesson_detail(user_id, lesson_id)
        .await
        .map_err(engine_failure)?;
    Ok(Json(lesson.into()))
}

/// The caller's progress records, one per attempted lesson.
#[utoipa::path(
    get,
    path = "/progress",
    responses((status = 200, description = "Progress records", body = [ProgressResponse])),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn progress_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HandlerResult<Vec<ProgressResponse>> {
    let records = app_state
        .engine
        .progress(user_id)
        .await
        .map_err(engine_failure)?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// Open a practice session. Needs an unlocked lesson and at least one heart.
#[utoipa::path(
    post,
    path = "/lessons/{id}/start",
    responses(
        (status = 200, description = "The session id and the lesson to practice", body = SessionStartResponse),
        (status = 403, description = "Lesson locked or no hearts left", body = ErrorResponse),
        (status = 404, description = "Unknown lesson", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Lesson id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn start_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(lesson_id): Path<i64>,
) -> HandlerResult<SessionStartResponse> {
    let ticket = app_state
        .engine
        .start_session(user_id, lesson_id)
        .await
        .map_err(engine_failure)?;
    Ok(Json(ticket.into()))
}

/// Submit the answers of a started session and apply the result.
#[utoipa::path(
    post,
    path = "/lessons/{id}/submit",
    request_body = SubmitSessionRequest,
    responses(
        (status = 200, description = "Session applied", body = SessionResultResponse),
        (status = 400, description = "Invalid submission", body = ErrorResponse),
        (status = 403, description = "Lesson locked, or the session was never started", body = ErrorResponse),
        (status = 409, description = "Session already submitted or too much contention", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Lesson id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn submit_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(lesson_id): Path<i64>,
    Json(payload): Json<SubmitSessionRequest>,
) -> HandlerResult<SessionResultResponse> {
    let receipt = app_state
        .engine
        .submit_session(user_id, lesson_id, payload.session_id, payload.answers)
        .await
        .map_err(engine_failure)?;
    Ok(Json(receipt.into()))
}

/// The caller's mistake notebook, oldest first.
#[utoipa::path(
    get,
    path = "/mistakes",
    responses((status = 200, description = "Mistake entries", body = [MistakeResponse])),
    params(
        MistakeQuery,
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn list_mistakes_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<MistakeQuery>,
) -> HandlerResult<Vec<MistakeResponse>> {
    let entries = app_state
        .engine
        .list_mistakes(user_id, MasteryFilter::from_flag(query.mastered))
        .await
        .map_err(engine_failure)?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/mistakes/{id}/master",
    responses(
        (status = 200, description = "Entry marked as mastered", body = MistakeResponse),
        (status = 404, description = "No such entry for this user", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Mistake entry id"),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn master_mistake_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(entry_id): Path<Uuid>,
) -> HandlerResult<MistakeResponse> {
    let entry = app_state
        .engine
        .mark_mastered(user_id, entry_id)
        .await
        .map_err(engine_failure)?;
    Ok(Json(entry.into()))
}

#[utoipa::path(
    get,
    path = "/shop/items",
    responses((status = 200, description = "The shop catalog", body = [ShopItemResponse]))
)]
pub async fn list_items_handler(
    State(app_state): State<Arc<AppState>>,
) -> Json<Vec<ShopItemResponse>> {
    Json(app_state.engine.catalog().iter().map(Into::into).collect())
}

/// Buy one item with coins.
#[utoipa::path(
    post,
    path = "/shop/purchase",
    request_body = PurchaseRequest,
    responses(
        (status = 200, description = "Purchase applied", body = PurchaseResponse),
        (status = 402, description = "Not enough coins", body = ErrorResponse),
        (status = 404, description = "Unknown item", body = ErrorResponse)
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn purchase_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<PurchaseRequest>,
) -> HandlerResult<PurchaseResponse> {
    let receipt = app_state
        .engine
        .purchase(user_id, payload.item_id)
        .await
        .map_err(engine_failure)?;
    Ok(Json(receipt.into()))
}

#[utoipa::path(
    get,
    path = "/leaderboard",
    responses((status = 200, description = "Top learners by experience", body = [LeaderboardEntryResponse])),
    params(LeaderboardQuery)
)]
pub async fn leaderboard_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> HandlerResult<Vec<LeaderboardEntryResponse>> {
    let entries = app_state
        .engine
        .leaderboard(query.limit)
        .await
        .map_err(engine_failure)?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/users/me",
    responses((status = 200, description = "The caller's profile", body = ProfileResponse)),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn get_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> HandlerResult<ProfileResponse> {
    let profile = app_state
        .engine
        .profile(user_id)
        .await
        .map_err(engine_failure)?;
    Ok(Json(profile.into()))
}

#[utoipa::path(
    put,
    path = "/users/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Username updated", body = ProfileResponse),
        (status = 400, description = "Invalid or taken username", body = ErrorResponse)
    ),
    params(("x-user-id" = Uuid, Header, description = "The unique ID of the user."))
)]
pub async fn update_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<UpdateProfileRequest>,
) -> HandlerResult<ProfileResponse> {
    let profile = app_state
        .engine
        .update_username(user_id, &payload.username)
        .await
        .map_err(engine_failure)?;
    Ok(Json(profile.into()))
}
