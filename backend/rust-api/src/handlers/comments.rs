use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::ValidatedJson,
    middlewares::auth::JwtClaims,
    models::comment::{CreateCommentRequest, UpdateCommentRequest},
    services::{comment_service::CommentService, AppState},
};

/// GET /api/v1/posts/{id}/comments
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Listing comments of post {}", post_id);

    let threads = CommentService::new(state.store.clone())
        .list_threads(&post_id)
        .await?;

    Ok(Json(threads))
}

/// POST /api/v1/posts/{id}/comments
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(post_id): Path<String>,
    ValidatedJson(req): ValidatedJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("User {} commenting on post {}", claims.sub, post_id);

    let comment = CommentService::new(state.store.clone())
        .add_comment(&post_id, &claims.sub, req)
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// PATCH /api/v1/comments/{id}
pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(comment_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("User {} editing comment {}", claims.sub, comment_id);

    let comment = CommentService::new(state.store.clone())
        .edit_comment(&comment_id, &claims.sub, &req.contenu)
        .await?;

    Ok(Json(comment))
}

/// DELETE /api/v1/comments/{id}
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(comment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("User {} deleting comment {}", claims.sub, comment_id);

    let removed = CommentService::new(state.store.clone())
        .delete_comment(&comment_id, &claims.sub, claims.user_role())
        .await?;
    tracing::debug!("Removed {} comment rows", removed);

    Ok(StatusCode::NO_CONTENT)
}
