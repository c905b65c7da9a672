use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::engagement_service::EngagementService;
use super::guard::InFlightGuard;
use super::ServiceError;
use crate::models::{
    CreatePostRequest, FeedItem, FeedQuery, Post, PostDetail, PostKind, QuizQuestion, Upload,
    UserProfile, UserRole,
};
use crate::store::{
    find_one, from_record, from_records, to_record, Collection, ContentStore, Filter, Query,
    Record,
};
use crate::utils::time::{now_millis, to_sortable_string};
use crate::utils::video::embed_for;

pub const MAX_FEED_LIMIT: u32 = 100;
pub const RECENT_POSTS_LIMIT: u64 = 5;

pub struct PostService {
    store: Arc<dyn ContentStore>,
    engagement: EngagementService,
}

impl PostService {
    pub fn new(store: Arc<dyn ContentStore>, guard: Arc<dyn InFlightGuard>) -> Self {
        Self {
            engagement: EngagementService::new(store.clone(), guard),
            store,
        }
    }

    /// Stores a validated post. Counters start at zero and posts by admins
    /// are marked official.
    pub async fn create_post(
        &self,
        author_id: &str,
        role: UserRole,
        req: CreatePostRequest,
    ) -> Result<Post, ServiceError> {
        req.check()
            .map_err(|e| ServiceError::BadRequest(e.to_string()))?;

        let tags = req.normalized_tags();
        let post = Post {
            id: Uuid::new_v4().to_string(),
            title: req.titre.trim().to_string(),
            body: req.contenu,
            chapter: req.chapitre,
            tags,
            author_id: author_id.to_string(),
            created_at: now_millis(),
            updated_at: None,
            likes_count: 0,
            vues_count: 0,
            partages_count: 0,
            officiel: role == UserRole::Admin,
            actif: true,
            kind: req.kind,
        };

        self.store
            .insert(Collection::Posts, to_record(&post)?)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert post: {}", e);
                e
            })?;

        tracing::info!(
            "Created {} post {} by {}",
            post.kind.post_type().as_str(),
            post.id,
            author_id
        );
        Ok(post)
    }

    async fn find_active(&self, post_id: &str) -> Result<Post, ServiceError> {
        find_one(
            self.store.as_ref(),
            Collection::Posts,
            &[Filter::eq("id", post_id), Filter::eq("actif", true)],
        )
        .await?
        .ok_or(ServiceError::NotFound("Post"))
    }

    async fn author(&self, author_id: &str) -> Result<Option<UserProfile>, ServiceError> {
        Ok(find_one(
            self.store.as_ref(),
            Collection::Users,
            &[Filter::eq("id", author_id)],
        )
        .await?)
    }

    /// Detail view of an active post. Every call counts as one view.
    pub async fn get_post(
        &self,
        post_id: &str,
        viewer: Option<&str>,
    ) -> Result<PostDetail, ServiceError> {
        let mut post = self.find_active(post_id).await?;

        // A failed view count does not fail the read
        match self.engagement.record_view(post_id).await {
            Ok(vues_count) => post.vues_count = vues_count,
            Err(e) => tracing::warn!("View not counted for {}: {}", post_id, e),
        }

        let author = self.author(&post.author_id).await?;
        let uploads: Vec<Upload> = from_records(
            self.store
                .select(
                    Collection::Uploads,
                    &Query::new()
                        .filter(Filter::eq("post_id", post_id))
                        .sort_asc("date_upload"),
                )
                .await?,
        )?;
        let is_liked = match viewer {
            Some(user_id) => self.engagement.is_liked(user_id, post_id).await?,
            None => false,
        };
        let video_embed = match &post.kind {
            PostKind::Video { video_url } => Some(embed_for(video_url)),
            PostKind::Cours | PostKind::Exercice { .. } | PostKind::Quiz { .. } => None,
        };

        Ok(PostDetail {
            post,
            author,
            uploads,
            is_liked,
            video_embed,
        })
    }

    pub async fn list_feed(
        &self,
        query: &FeedQuery,
        default_limit: u32,
        viewer: Option<&str>,
    ) -> Result<Vec<FeedItem>, ServiceError> {
        let limit = query
            .limit
            .unwrap_or(default_limit)
            .clamp(1, MAX_FEED_LIMIT);

        let mut q = Query::new().filter(Filter::eq("actif", true));
        if let Some(post_type) = query.post_type {
            q = q.filter(Filter::eq("type", post_type.as_str()));
        }
        if let Some(chapter) = query.chapitre {
            q = q.filter(Filter::eq("chapitre", chapter.as_str()));
        }
        q = q.sort_desc(query.sort_by.field()).limit(limit as u64);

        let posts: Vec<Post> = from_records(self.store.select(Collection::Posts, &q).await?)?;
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        // One lookup per related collection for the whole page
        let post_ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        let author_ids: HashSet<&str> = posts.iter().map(|p| p.author_id.as_str()).collect();

        let authors: Vec<UserProfile> = from_records(
            self.store
                .select(
                    Collection::Users,
                    &Query::new().filter(Filter::any_of("id", author_ids)),
                )
                .await?,
        )?;
        let authors: HashMap<String, UserProfile> =
            authors.into_iter().map(|a| (a.id.clone(), a)).collect();

        let comments = self
            .store
            .select(
                Collection::Comments,
                &Query::new().filter(Filter::any_of("post_id", post_ids.iter().copied())),
            )
            .await?;
        let mut comment_counts: HashMap<String, u64> = HashMap::new();
        for comment in &comments {
            if let Some(post_id) = comment.get("post_id").and_then(Value::as_str) {
                *comment_counts.entry(post_id.to_string()).or_default() += 1;
            }
        }

        let liked: HashSet<String> = match viewer {
            Some(user_id) => self
                .store
                .select(
                    Collection::Likes,
                    &Query::new()
                        .filter(Filter::eq("user_id", user_id))
                        .filter(Filter::any_of("post_id", post_ids.iter().copied())),
                )
                .await?
                .iter()
                .filter_map(|like| like.get("post_id").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
            None => HashSet::new(),
        };

        Ok(posts
            .into_iter()
            .map(|post| FeedItem {
                author: authors.get(&post.author_id).cloned(),
                comments_count: comment_counts.get(&post.id).copied().unwrap_or(0),
                is_liked: liked.contains(&post.id),
                post,
            })
            .collect())
    }

    /// Newest active posts of one author
    pub async fn list_author_posts(&self, author_id: &str) -> Result<Vec<Post>, ServiceError> {
        let records = self
            .store
            .select(
                Collection::Posts,
                &Query::new()
                    .filter(Filter::eq("auteur_id", author_id))
                    .filter(Filter::eq("actif", true))
                    .sort_desc("date_creation")
                    .limit(RECENT_POSTS_LIMIT),
            )
            .await?;
        Ok(from_records(records)?)
    }

    /// Hides a post. Only its author or an admin may do this.
    pub async fn deactivate_post(
        &self,
        post_id: &str,
        actor_id: &str,
        role: UserRole,
    ) -> Result<(), ServiceError> {
        let post = self.find_active(post_id).await?;
        if post.author_id != actor_id && role != UserRole::Admin {
            return Err(ServiceError::Forbidden(
                "Only the author or an admin can delete this post".to_string(),
            ));
        }

        let mut patch = Record::new();
        patch.insert("actif".to_string(), Value::Bool(false));
        patch.insert(
            "date_modification".to_string(),
            Value::String(to_sortable_string(now_millis())),
        );
        self.store.update(Collection::Posts, post_id, patch).await?;

        tracing::info!("Post {} deactivated by {}", post_id, actor_id);
        Ok(())
    }

    /// Questions and time limit (minutes) of an active quiz post
    pub async fn load_quiz(
        &self,
        post_id: &str,
    ) -> Result<(Vec<QuizQuestion>, Option<u32>), ServiceError> {
        let record = self
            .store
            .select_single(
                Collection::Posts,
                &[Filter::eq("id", post_id), Filter::eq("actif", true)],
            )
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    ServiceError::NotFound("Post")
                } else {
                    e.into()
                }
            })?;
        let post: Post = from_record(record)?;

        match post.kind {
            PostKind::Quiz {
                questions,
                time_limit,
                ..
            } => Ok((questions, time_limit)),
            PostKind::Cours | PostKind::Exercice { .. } | PostKind::Video { .. } => Err(
                ServiceError::BadRequest(format!("Post {} is not a quiz", post_id)),
            ),
        }
    }
}
