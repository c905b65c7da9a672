use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::guard::{like_key, GuardLease, InFlightGuard};
use super::ServiceError;
use crate::metrics::record_engagement;
use crate::models::{
    CounterSnapshot, LikeMembership, LikeToggleResponse, ReconcileResponse, ShareResponse,
};
use crate::store::{find_one, to_record, Collection, ContentStore, Filter, Record, StoreError};
use crate::utils::time::now_millis;

pub const LIKES_FIELD: &str = "likes_count";
pub const VIEWS_FIELD: &str = "vues_count";
pub const SHARES_FIELD: &str = "partages_count";

/// Likes, views and shares on posts.
///
/// Counters only move through the store's atomic increment, and the like
/// counter only moves when the membership row was actually inserted or
/// removed, so it cannot drift from the number of memberships.
pub struct EngagementService {
    store: Arc<dyn ContentStore>,
    guard: Arc<dyn InFlightGuard>,
}

fn counter(record: &Record, field: &str) -> u64 {
    record.get(field).and_then(Value::as_u64).unwrap_or(0)
}

impl EngagementService {
    pub fn new(store: Arc<dyn ContentStore>, guard: Arc<dyn InFlightGuard>) -> Self {
        Self { store, guard }
    }

    async fn active_post(&self, post_id: &str) -> Result<Record, ServiceError> {
        self.store
            .select_single(
                Collection::Posts,
                &[Filter::eq("id", post_id), Filter::eq("actif", true)],
            )
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => ServiceError::NotFound("Post"),
                other => other.into(),
            })
    }

    pub async fn is_liked(&self, user_id: &str, post_id: &str) -> Result<bool, ServiceError> {
        let count = self
            .store
            .count(
                Collection::Likes,
                &[Filter::eq("user_id", user_id), Filter::eq("post_id", post_id)],
            )
            .await?;
        Ok(count > 0)
    }

    /// Flips the like of `user_id` on `post_id`. A concurrent toggle for the
    /// same pair is rejected with `GuardError::Busy`.
    pub async fn toggle_like(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<LikeToggleResponse, ServiceError> {
        self.active_post(post_id).await?;

        let lease = GuardLease::acquire(self.guard.clone(), &like_key(user_id, post_id)).await?;
        let result = self.toggle_like_locked(user_id, post_id).await;
        lease.release().await;

        result
    }

    /// Moves `likes_count` after a membership change that already happened.
    /// A failure here leaves the counter one step off until reconciled.
    async fn shift_likes(&self, post_id: &str, delta: i64) -> Result<Record, ServiceError> {
        self.store
            .increment(Collection::Posts, post_id, LIKES_FIELD, delta)
            .await
            .map_err(|e| {
                tracing::error!(
                    post_id = %post_id,
                    delta,
                    error = %e,
                    "likes_count is out of step with memberships until reconciled"
                );
                ServiceError::from(e)
            })
    }

    async fn toggle_like_locked(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<LikeToggleResponse, ServiceError> {
        let existing: Option<LikeMembership> = find_one(
            self.store.as_ref(),
            Collection::Likes,
            &[Filter::eq("user_id", user_id), Filter::eq("post_id", post_id)],
        )
        .await?;

        match existing {
            Some(membership) => {
                let post = match self.store.delete(Collection::Likes, &membership.id).await {
                    Ok(()) => {
                        record_engagement("unlike");
                        self.shift_likes(post_id, -1).await?
                    }
                    // Someone else removed it first; the counter already reflects that
                    Err(e) if e.is_not_found() => self.active_post(post_id).await?,
                    Err(e) => {
                        tracing::error!("Failed to remove like {}: {}", membership.id, e);
                        return Err(e.into());
                    }
                };

                tracing::info!("User {} unliked post {}", user_id, post_id);
                Ok(LikeToggleResponse {
                    is_liked: false,
                    likes_count: counter(&post, LIKES_FIELD),
                })
            }
            None => {
                let membership = LikeMembership {
                    id: Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    post_id: post_id.to_string(),
                    date_creation: now_millis(),
                };

                let post = match self
                    .store
                    .insert(Collection::Likes, to_record(&membership)?)
                    .await
                {
                    Ok(_) => {
                        record_engagement("like");
                        self.shift_likes(post_id, 1).await?
                    }
                    Err(StoreError::Conflict { .. }) => self.active_post(post_id).await?,
                    Err(e) => {
                        tracing::error!(
                            "Failed to record like of {} on {}: {}",
                            user_id,
                            post_id,
                            e
                        );
                        return Err(e.into());
                    }
                };

                tracing::info!("User {} liked post {}", user_id, post_id);
                Ok(LikeToggleResponse {
                    is_liked: true,
                    likes_count: counter(&post, LIKES_FIELD),
                })
            }
        }
    }

    /// Counts one view. Returns the new view count.
    pub async fn record_view(&self, post_id: &str) -> Result<u64, ServiceError> {
        let post = self
            .store
            .increment(Collection::Posts, post_id, VIEWS_FIELD, 1)
            .await
            .map_err(|e| {
                tracing::warn!("Failed to record view on {}: {}", post_id, e);
                e
            })?;
        record_engagement("view");
        Ok(counter(&post, VIEWS_FIELD))
    }

    pub async fn record_share(&self, post_id: &str) -> Result<ShareResponse, ServiceError> {
        self.active_post(post_id).await?;

        let post = self
            .store
            .increment(Collection::Posts, post_id, SHARES_FIELD, 1)
            .await
            .map_err(|e| {
                tracing::error!("Failed to record share on {}: {}", post_id, e);
                e
            })?;
        record_engagement("share");

        Ok(ShareResponse {
            partages_count: counter(&post, SHARES_FIELD),
        })
    }

    /// Fresh counters for one post, for clients to resync from.
    pub async fn snapshot(
        &self,
        post_id: &str,
        viewer: Option<&str>,
    ) -> Result<CounterSnapshot, ServiceError> {
        let post = self.active_post(post_id).await?;
        let is_liked = match viewer {
            Some(user_id) => self.is_liked(user_id, post_id).await?,
            None => false,
        };

        Ok(CounterSnapshot {
            post_id: post_id.to_string(),
            likes_count: counter(&post, LIKES_FIELD),
            vues_count: counter(&post, VIEWS_FIELD),
            partages_count: counter(&post, SHARES_FIELD),
            is_liked,
        })
    }

    /// Rewrites `likes_count` from the membership rows.
    pub async fn reconcile_likes(&self, post_id: &str) -> Result<ReconcileResponse, ServiceError> {
        let post = self
            .store
            .select_single(Collection::Posts, &[Filter::eq("id", post_id)])
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => ServiceError::NotFound("Post"),
                other => other.into(),
            })?;
        let previous = counter(&post, LIKES_FIELD);

        let actual = self
            .store
            .count(Collection::Likes, &[Filter::eq("post_id", post_id)])
            .await?;

        if actual != previous {
            let mut patch = Record::new();
            patch.insert(LIKES_FIELD.to_string(), Value::from(actual));
            self.store.update(Collection::Posts, post_id, patch).await?;
            tracing::warn!(
                "Reconciled likes on post {}: {} -> {}",
                post_id,
                previous,
                actual
            );
        }

        Ok(ReconcileResponse {
            previous_likes_count: previous,
            likes_count: actual,
        })
    }
}
