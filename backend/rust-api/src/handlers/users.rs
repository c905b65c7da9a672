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
    models::{CreateProfileRequest, CreateProfileResponse, Dashboard},
    services::{post_service::PostService, user_service::UserService, AppState},
};

/// POST /api/v1/users/profile
///
/// Idempotent sign-up hook: 201 when the profile is created, 200 with the
/// stored profile when it already exists.
pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    ValidatedJson(req): ValidatedJson<CreateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Profile creation requested by {}", claims.sub);

    let (user, created) = UserService::new(state.store.clone())
        .create_profile(&claims.sub, req)
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(CreateProfileResponse { created, user })))
}

/// GET /api/v1/users/{id}
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = UserService::new(state.store.clone())
        .get_profile(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(profile))
}

/// GET /api/v1/users/me/dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Dashboard for user {}", claims.sub);

    let stats = UserService::new(state.store.clone())
        .dashboard_stats(&claims.sub)
        .await?;
    let recent_posts = PostService::new(state.store.clone(), state.guard.clone())
        .list_author_posts(&claims.sub)
        .await?;

    Ok(Json(Dashboard {
        stats,
        recent_posts,
    }))
}
