use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::sortable;

/// Row of the `likes` collection: "this user likes this post".
/// `(user_id, post_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikeMembership {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    #[serde(with = "sortable")]
    pub date_creation: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeToggleResponse {
    pub is_liked: bool,
    pub likes_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareResponse {
    pub partages_count: u64,
}

/// Fresh, read-only view of a post's counters, used to resync a client
/// instead of trusting locally mutated values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub post_id: String,
    pub likes_count: u64,
    pub vues_count: u64,
    pub partages_count: u64,
    pub is_liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub previous_likes_count: u64,
    pub likes_count: u64,
}
