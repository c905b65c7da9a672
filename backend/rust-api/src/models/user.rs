use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::time::sortable;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Utilisateur,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Utilisateur => "utilisateur",
            UserRole::Admin => "admin",
        }
    }

    pub fn from_claim(role: &str) -> Self {
        if role == "admin" {
            UserRole::Admin
        } else {
            UserRole::Utilisateur
        }
    }
}

/// Public profile row from the `users` collection. The id is the one issued
/// by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_profil: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(with = "sortable")]
    pub date_inscription: DateTime<Utc>,
}

/// Request to create the profile row after sign-up
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProfileRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, max = 100, message = "Last name must be between 1 and 100 characters"))]
    pub nom: String,

    #[validate(length(min = 1, max = 100, message = "First name must be between 1 and 100 characters"))]
    pub prenom: String,

    pub bio: Option<String>,
    pub photo_profil: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateProfileResponse {
    pub created: bool,
    pub user: UserProfile,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct DashboardStats {
    pub posts_count: u64,
    pub likes_received: u64,
    pub views_count: u64,
    pub comments_count: u64,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub recent_posts: Vec<super::post::Post>,
}
