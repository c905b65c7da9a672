use std::sync::Arc;

use super::ServiceError;
use crate::utils::time::now_millis;
use crate::models::{CreateProfileRequest, DashboardStats, Post, UserProfile, UserRole};
use crate::store::{
    find_one, from_records, to_record, Collection, ContentStore, Filter, Query, StoreError,
};

pub struct UserService {
    store: Arc<dyn ContentStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Creates the profile for `user_id` unless it already exists.
    /// Returns the profile and whether it was created by this call.
    pub async fn create_profile(
        &self,
        user_id: &str,
        req: CreateProfileRequest,
    ) -> Result<(UserProfile, bool), ServiceError> {
        if let Some(existing) = self.get_profile(user_id).await? {
            return Ok((existing, false));
        }

        let profile = UserProfile {
            id: user_id.to_string(),
            email: req.email.trim().to_lowercase(),
            nom: req.nom.trim().to_string(),
            prenom: req.prenom.trim().to_string(),
            role: UserRole::Utilisateur,
            photo_profil: req.photo_profil,
            bio: req.bio,
            date_inscription: now_millis(),
        };

        match self
            .store
            .insert(Collection::Users, to_record(&profile)?)
            .await
        {
            Ok(_) => {
                tracing::info!("Created profile for user {}", user_id);
                Ok((profile, true))
            }
            // Lost a race with a concurrent sign-up request
            Err(StoreError::Conflict { .. }) => self
                .get_profile(user_id)
                .await?
                .map(|p| (p, false))
                .ok_or(ServiceError::NotFound("User")),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, ServiceError> {
        Ok(find_one(
            self.store.as_ref(),
            Collection::Users,
            &[Filter::eq("id", user_id)],
        )
        .await?)
    }

    /// Totals over the user's active posts plus the comments they wrote.
    pub async fn dashboard_stats(&self, user_id: &str) -> Result<DashboardStats, ServiceError> {
        let posts: Vec<Post> = from_records(
            self.store
                .select(
                    Collection::Posts,
                    &Query::new()
                        .filter(Filter::eq("auteur_id", user_id))
                        .filter(Filter::eq("actif", true)),
                )
                .await?,
        )?;

        let comments_count = self
            .store
            .count(Collection::Comments, &[Filter::eq("user_id", user_id)])
            .await?;

        Ok(DashboardStats {
            posts_count: posts.len() as u64,
            likes_received: posts.iter().map(|p| p.likes_count).sum(),
            views_count: posts.iter().map(|p| p.vues_count).sum(),
            comments_count,
        })
    }
}
