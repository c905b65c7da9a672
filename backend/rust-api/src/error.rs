use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::PostValidationError;
use crate::services::guard::GuardError;
use crate::services::quiz_engine::QuizError;
use crate::services::ServiceError;
use crate::store::StoreError;

/// Error returned by every handler. Rendered as `{"message", "status"}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Authentication required")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "message": self.message,
            "status": self.status.as_u16(),
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match &e {
            StoreError::NotFound { collection } => {
                ApiError::not_found(format!("{} not found", singular(collection)))
            }
            StoreError::Conflict { .. } => ApiError::conflict(e.to_string()),
            StoreError::MultipleRows { .. }
            | StoreError::NotACounter { .. }
            | StoreError::Backend(_)
            | StoreError::Serialization(_) => {
                tracing::error!("Store error: {}", e);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Storage error")
            }
        }
    }
}

impl From<QuizError> for ApiError {
    fn from(e: QuizError) -> Self {
        let status = match &e {
            QuizError::InvalidTransition { .. } | QuizError::EmptyQuiz => StatusCode::CONFLICT,
            QuizError::UnknownQuestion(_)
            | QuizError::NotCurrentQuestion(_)
            | QuizError::OptionOutOfRange { .. } => StatusCode::BAD_REQUEST,
            QuizError::NoAnswer | QuizError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<PostValidationError> for ApiError {
    fn from(e: PostValidationError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

impl From<GuardError> for ApiError {
    fn from(e: GuardError) -> Self {
        match e {
            GuardError::Busy => ApiError::conflict(e.to_string()),
            GuardError::Backend(_) => {
                tracing::error!("In-flight guard error: {}", e);
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "Please retry shortly")
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            ServiceError::Forbidden(message) => ApiError::forbidden(message),
            ServiceError::BadRequest(message) => ApiError::bad_request(message),
            ServiceError::Quiz(e) => e.into(),
            ServiceError::Store(e) => e.into(),
            ServiceError::Guard(e) => e.into(),
        }
    }
}

fn singular(collection: &str) -> &str {
    match collection {
        "posts" => "Post",
        "users" => "User",
        "comments" => "Comment",
        "likes" => "Like",
        "uploads" => "Upload",
        other => other,
    }
}
