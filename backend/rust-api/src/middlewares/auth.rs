use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::error::ApiError;
use crate::models::UserRole;
use crate::services::AppState;

/// Claims issued by the auth provider. `sub` is the user id.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

impl JwtClaims {
    pub fn new(user_id: &str, role: UserRole, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            role: role.as_str().to_string(),
            exp: (now + ttl_seconds).max(0) as usize,
            iat: now.max(0) as usize,
        }
    }

    pub fn user_role(&self) -> UserRole {
        UserRole::from_claim(&self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.user_role() == UserRole::Admin
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    ExpiredToken,
    #[error("Invalid token signature")]
    InvalidSignature,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken,
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Requires a valid bearer token and stores its claims in the request.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers).ok_or_else(ApiError::unauthorized)?;

    let jwt_service = JwtService::new(&state.config.jwt_secret);
    let claims = jwt_service.validate_token(token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        ApiError::new(axum::http::StatusCode::UNAUTHORIZED, e.to_string())
    })?;

    tracing::debug!("Authenticated user: {} (role: {})", claims.sub, claims.role);
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Allows anonymous requests; a valid token still attaches its claims.
pub async fn optional_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&headers) {
        let jwt_service = JwtService::new(&state.config.jwt_secret);
        match jwt_service.validate_token(token) {
            Ok(claims) => {
                request.extensions_mut().insert(claims);
            }
            Err(e) => tracing::debug!("Ignoring invalid token on public route: {}", e),
        }
    }

    next.run(request).await
}

pub async fn admin_guard_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    match request.extensions().get::<JwtClaims>() {
        Some(claims) if claims.is_admin() => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Access denied: admin role required");
            Err(ApiError::forbidden("Admin role required"))
        }
        None => Err(ApiError::unauthorized()),
    }
}
