use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    extractors::{AppQuery, ValidatedJson},
    middlewares::auth::JwtClaims,
    models::{CreatePostRequest, FeedQuery},
    services::{engagement_service::EngagementService, post_service::PostService, AppState},
};

fn post_service(state: &AppState) -> PostService {
    PostService::new(state.store.clone(), state.guard.clone())
}

fn engagement_service(state: &AppState) -> EngagementService {
    EngagementService::new(state.store.clone(), state.guard.clone())
}

fn viewer(claims: &Option<Extension<JwtClaims>>) -> Option<&str> {
    claims.as_ref().map(|Extension(c)| c.sub.as_str())
}

/// GET /api/v1/posts
pub async fn list_feed(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    AppQuery(query): AppQuery<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        "Listing feed: type={:?}, chapitre={:?}, sort={:?}",
        query.post_type,
        query.chapitre,
        query.sort_by
    );

    let items = post_service(&state)
        .list_feed(&query, state.config.feed_default_limit, viewer(&claims))
        .await?;

    Ok(Json(items))
}

/// POST /api/v1/posts
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ValidatedJson(req): ValidatedJson<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        "Creating {} post for user {}",
        req.kind.post_type().as_str(),
        claims.sub
    );

    let post = post_service(&state)
        .create_post(&claims.sub, claims.user_role(), req)
        .await?;

    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /api/v1/posts/{id}
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Getting post: {}", post_id);

    let detail = post_service(&state)
        .get_post(&post_id, viewer(&claims))
        .await?;

    Ok(Json(detail))
}

/// DELETE /api/v1/posts/{id}
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("User {} deleting post {}", claims.sub, post_id);

    post_service(&state)
        .deactivate_post(&post_id, &claims.sub, claims.user_role())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/posts/{id}/like
pub async fn toggle_like(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("User {} toggling like on post {}", claims.sub, post_id);

    let response = engagement_service(&state)
        .toggle_like(&claims.sub, &post_id)
        .await
        .inspect_err(|e| tracing::warn!("Like toggle failed for post {}: {}", post_id, e))?;

    Ok(Json(response))
}

/// POST /api/v1/posts/{id}/share
pub async fn share_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Share panel opened for post {}", post_id);

    let response = engagement_service(&state).record_share(&post_id).await?;

    Ok(Json(response))
}

/// GET /api/v1/posts/{id}/counters
pub async fn get_counters(
    State(state): State<Arc<AppState>>,
    claims: Option<Extension<JwtClaims>>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::debug!("Counter snapshot for post {}", post_id);

    let snapshot = engagement_service(&state)
        .snapshot(&post_id, viewer(&claims))
        .await?;

    Ok(Json(snapshot))
}

/// POST /api/v1/posts/{id}/counters/reconcile (admin)
pub async fn reconcile_counters(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Admin {} reconciling likes of post {}", claims.sub, post_id);

    let response = engagement_service(&state).reconcile_likes(&post_id).await?;

    Ok(Json(response))
}
