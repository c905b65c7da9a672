use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::ServiceError;
use crate::models::{
    Comment, CommentThread, CommentWithAuthor, CreateCommentRequest, UserProfile, UserRole,
};
use crate::store::{
    find_one, from_record, from_records, to_record, Collection, ContentStore, Filter, Query,
    Record,
};
use crate::utils::time::{now_millis, to_sortable_string};

pub struct CommentService {
    store: Arc<dyn ContentStore>,
}

impl CommentService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    async fn find(&self, comment_id: &str) -> Result<Comment, ServiceError> {
        find_one(
            self.store.as_ref(),
            Collection::Comments,
            &[Filter::eq("id", comment_id)],
        )
        .await?
        .ok_or(ServiceError::NotFound("Comment"))
    }

    /// Adds a comment, or a reply when `parent_id` names a top-level
    /// comment of the same post. Replies to replies are rejected.
    pub async fn add_comment(
        &self,
        post_id: &str,
        user_id: &str,
        req: CreateCommentRequest,
    ) -> Result<Comment, ServiceError> {
        let contenu = req.contenu.trim();
        if contenu.is_empty() {
            return Err(ServiceError::BadRequest("Comment cannot be empty".to_string()));
        }

        let post_exists = self
            .store
            .count(
                Collection::Posts,
                &[Filter::eq("id", post_id), Filter::eq("actif", true)],
            )
            .await?;
        if post_exists == 0 {
            return Err(ServiceError::NotFound("Post"));
        }

        if let Some(parent_id) = &req.parent_id {
            let parent = self.find(parent_id).await?;
            if parent.post_id != post_id || parent.parent_id.is_some() {
                return Err(ServiceError::BadRequest(
                    "Replies must target a top-level comment of the same post".to_string(),
                ));
            }
        }

        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            contenu: contenu.to_string(),
            date_creation: now_millis(),
            date_modification: None,
            parent_id: req.parent_id,
        };
        self.store
            .insert(Collection::Comments, to_record(&comment)?)
            .await?;

        tracing::info!("Comment {} added on post {} by {}", comment.id, post_id, user_id);
        Ok(comment)
    }

    /// Top-level comments oldest first, each with its replies oldest first.
    pub async fn list_threads(&self, post_id: &str) -> Result<Vec<CommentThread>, ServiceError> {
        let comments: Vec<Comment> = from_records(
            self.store
                .select(
                    Collection::Comments,
                    &Query::new()
                        .filter(Filter::eq("post_id", post_id))
                        .sort_asc("date_creation"),
                )
                .await?,
        )?;

        let mut authors: HashMap<String, Option<UserProfile>> = HashMap::new();
        for comment in &comments {
            if !authors.contains_key(&comment.user_id) {
                let author = find_one(
                    self.store.as_ref(),
                    Collection::Users,
                    &[Filter::eq("id", comment.user_id.as_str())],
                )
                .await?;
                authors.insert(comment.user_id.clone(), author);
            }
        }
        let with_author = |comment: Comment| CommentWithAuthor {
            author: authors.get(&comment.user_id).cloned().flatten(),
            comment,
        };

        let (top_level, replies): (Vec<Comment>, Vec<Comment>) =
            comments.into_iter().partition(|c| c.parent_id.is_none());

        let mut replies_by_parent: HashMap<String, Vec<CommentWithAuthor>> = HashMap::new();
        for reply in replies {
            if let Some(parent_id) = reply.parent_id.clone() {
                replies_by_parent
                    .entry(parent_id)
                    .or_default()
                    .push(with_author(reply));
            }
        }

        Ok(top_level
            .into_iter()
            .map(|comment| {
                let replies = replies_by_parent.remove(&comment.id).unwrap_or_default();
                CommentThread {
                    comment: with_author(comment),
                    replies,
                }
            })
            .collect())
    }

    pub async fn edit_comment(
        &self,
        comment_id: &str,
        user_id: &str,
        contenu: &str,
    ) -> Result<Comment, ServiceError> {
        let contenu = contenu.trim();
        if contenu.is_empty() {
            return Err(ServiceError::BadRequest("Comment cannot be empty".to_string()));
        }

        let comment = self.find(comment_id).await?;
        if comment.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "Only the author can edit this comment".to_string(),
            ));
        }

        let mut patch = Record::new();
        patch.insert("contenu".to_string(), Value::String(contenu.to_string()));
        patch.insert(
            "date_modification".to_string(),
            Value::String(to_sortable_string(now_millis())),
        );
        let updated = self
            .store
            .update(Collection::Comments, comment_id, patch)
            .await?;

        Ok(from_record(updated)?)
    }

    /// Deletes a comment and its replies. Returns how many rows were removed.
    pub async fn delete_comment(
        &self,
        comment_id: &str,
        user_id: &str,
        role: UserRole,
    ) -> Result<u64, ServiceError> {
        let comment = self.find(comment_id).await?;
        if comment.user_id != user_id && role != UserRole::Admin {
            return Err(ServiceError::Forbidden(
                "Only the author or an admin can delete this comment".to_string(),
            ));
        }

        let replies = self
            .store
            .delete_where(Collection::Comments, &[Filter::eq("parent_id", comment_id)])
            .await?;
        self.store.delete(Collection::Comments, comment_id).await?;

        tracing::info!(
            "Comment {} deleted by {} ({} replies removed)",
            comment_id,
            user_id,
            replies
        );
        Ok(replies + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryContentStore;
    use serde_json::json;

    async fn setup() -> CommentService {
        let store: Arc<dyn ContentStore> = Arc::new(InMemoryContentStore::new());
        if let Value::Object(record) = json!({"id": "p1", "actif": true}) {
            store.insert(Collection::Posts, record).await.unwrap();
        }
        CommentService::new(store)
    }

    fn body(contenu: &str, parent_id: Option<&str>) -> CreateCommentRequest {
        CreateCommentRequest {
            contenu: contenu.to_string(),
            parent_id: parent_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn threads_group_replies_under_parents() {
        let service = setup().await;
        let first = service.add_comment("p1", "u1", body("first", None)).await.unwrap();
        let second = service.add_comment("p1", "u2", body("second", None)).await.unwrap();
        service
            .add_comment("p1", "u2", body("reply", Some(&first.id)))
            .await
            .unwrap();

        let threads = service.list_threads("p1").await.unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.comment.id, first.id);
        assert_eq!(threads[0].replies.len(), 1);
        assert_eq!(threads[1].comment.comment.id, second.id);
        assert!(threads[1].replies.is_empty());
    }

    #[tokio::test]
    async fn rejects_blank_and_nested_replies() {
        let service = setup().await;
        assert!(matches!(
            service.add_comment("p1", "u1", body("   ", None)).await,
            Err(ServiceError::BadRequest(_))
        ));

        let top = service.add_comment("p1", "u1", body("top", None)).await.unwrap();
        let reply = service
            .add_comment("p1", "u1", body("reply", Some(&top.id)))
            .await
            .unwrap();
        assert!(matches!(
            service
                .add_comment("p1", "u1", body("nested", Some(&reply.id)))
                .await,
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn only_author_edits_and_delete_cascades() {
        let service = setup().await;
        let top = service.add_comment("p1", "u1", body("top", None)).await.unwrap();
        service
            .add_comment("p1", "u2", body("reply", Some(&top.id)))
            .await
            .unwrap();

        assert!(matches!(
            service.edit_comment(&top.id, "u2", "hijack").await,
            Err(ServiceError::Forbidden(_))
        ));
        let edited = service.edit_comment(&top.id, "u1", "edited").await.unwrap();
        assert_eq!(edited.contenu, "edited");
        assert!(edited.date_modification.is_some());

        assert_eq!(
            service
                .delete_comment(&top.id, "admin", UserRole::Admin)
                .await
                .unwrap(),
            2
        );
        assert!(service.list_threads("p1").await.unwrap().is_empty());
    }
}
