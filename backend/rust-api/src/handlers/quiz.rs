use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::{CreateQuizSessionRequest, SelectAnswerRequest},
    services::{post_service::PostService, AppState},
};

fn requester(claims: &Option<Extension<JwtClaims>>) -> Option<&str> {
    claims.as_ref().map(|Extension(c)| c.sub.as_str())
}

/// POST /api/v1/quiz-sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    AppJson(req): AppJson<CreateQuizSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        "Creating quiz session for post {} (user={:?})",
        req.post_id,
        requester(&claims)
    );

    let (questions, time_limit) = PostService::new(state.store.clone(), state.guard.clone())
        .load_quiz(&req.post_id)
        .await?;

    let session = state
        .quizzes
        .create(&req.post_id, requester(&claims), questions, time_limit)
        .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/quiz-sessions/{id}
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.quizzes.get(&session_id, requester(&claims)).await?;
    Ok(Json(session))
}

/// DELETE /api/v1/quiz-sessions/{id}
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Discarding quiz session {}", session_id);

    state.quizzes.remove(&session_id, requester(&claims)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/quiz-sessions/{id}/start
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Starting quiz session {}", session_id);

    let session = state.quizzes.start(&session_id, requester(&claims)).await?;
    Ok(Json(session))
}

/// POST /api/v1/quiz-sessions/{id}/answers
pub async fn select_answer(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SelectAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::debug!(
        "Session {}: option {} on question {}",
        session_id,
        req.option_index,
        req.question_id
    );

    let session = state
        .quizzes
        .select_answer(
            &session_id,
            requester(&claims),
            &req.question_id,
            req.option_index,
        )
        .await?;
    Ok(Json(session))
}

/// POST /api/v1/quiz-sessions/{id}/advance
pub async fn advance_session(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .quizzes
        .advance(&session_id, requester(&claims))
        .await?;
    Ok(Json(session))
}

/// POST /api/v1/quiz-sessions/{id}/restart
pub async fn restart_session(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Restarting quiz session {}", session_id);

    let session = state
        .quizzes
        .restart(&session_id, requester(&claims))
        .await?;
    Ok(Json(session))
}

/// GET /api/v1/quiz-sessions/{id}/result
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .quizzes
        .result(&session_id, requester(&claims))
        .await?;
    Ok(Json(result))
}
