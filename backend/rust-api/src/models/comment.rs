use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::user::UserProfile;
use crate::utils::time::{sortable, sortable_option};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub contenu: String,
    #[serde(with = "sortable")]
    pub date_creation: DateTime<Utc>,
    #[serde(
        default,
        with = "sortable_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_modification: Option<DateTime<Utc>>,
    /// Always a top-level comment of the same post
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 5000, message = "Comment must be between 1 and 5000 characters"))]
    pub contenu: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 5000, message = "Comment must be between 1 and 5000 characters"))]
    pub contenu: String,
}

#[derive(Debug, Serialize)]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<UserProfile>,
}

#[derive(Debug, Serialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: CommentWithAuthor,
    pub replies: Vec<CommentWithAuthor>,
}
