use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use super::quiz::{validate_quiz_authoring, Difficulty, QuizQuestion, QuizValidationError};
use super::upload::Upload;
use super::user::UserProfile;
use crate::utils::time::{sortable, sortable_option};
use crate::utils::video::VideoEmbed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chapter {
    Analyse,
    Algebre,
    Geometrie,
    Probabilites,
}

impl Chapter {
    pub fn as_str(&self) -> &str {
        match self {
            Chapter::Analyse => "analyse",
            Chapter::Algebre => "algebre",
            Chapter::Geometrie => "geometrie",
            Chapter::Probabilites => "probabilites",
        }
    }
}

/// Discriminant of [`PostKind`], used for feed filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostType {
    Cours,
    Exercice,
    Quiz,
    Video,
}

impl PostType {
    pub fn as_str(&self) -> &str {
        match self {
            PostType::Cours => "cours",
            PostType::Exercice => "exercice",
            PostType::Quiz => "quiz",
            PostType::Video => "video",
        }
    }
}

/// Kind-specific payload of a post. Stored flattened next to the common
/// fields with the discriminant in `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PostKind {
    Cours,
    Exercice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<Difficulty>,
    },
    Quiz {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<Difficulty>,
        /// Minutes
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_limit: Option<u32>,
        #[serde(default)]
        questions: Vec<QuizQuestion>,
    },
    Video {
        video_url: String,
    },
}

impl PostKind {
    pub fn post_type(&self) -> PostType {
        match self {
            PostKind::Cours => PostType::Cours,
            PostKind::Exercice { .. } => PostType::Exercice,
            PostKind::Quiz { .. } => PostType::Quiz,
            PostKind::Video { .. } => PostType::Video,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(rename = "titre")]
    pub title: String,
    /// Markdown with `$...$` / `$$...$$` math, returned verbatim
    #[serde(rename = "contenu")]
    pub body: String,
    #[serde(rename = "chapitre")]
    pub chapter: Chapter,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "auteur_id")]
    pub author_id: String,
    #[serde(rename = "date_creation", with = "sortable")]
    pub created_at: DateTime<Utc>,
    #[serde(
        rename = "date_modification",
        default,
        with = "sortable_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub vues_count: u64,
    #[serde(default)]
    pub partages_count: u64,
    #[serde(default)]
    pub officiel: bool,
    #[serde(default = "default_active")]
    pub actif: bool,
    #[serde(flatten)]
    pub kind: PostKind,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub titre: String,

    #[validate(length(min = 1, max = 50000, message = "Content must not be empty"))]
    pub contenu: String,

    pub chapitre: Chapter,

    /// Either a list or comma separated entries; blanks are dropped
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(flatten)]
    pub kind: PostKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostValidationError {
    #[error("Title and content are required")]
    MissingTitleOrBody,
    #[error("A video URL is required for video posts")]
    MissingVideoUrl,
    #[error(transparent)]
    Quiz(#[from] QuizValidationError),
}

impl CreatePostRequest {
    /// Kind-specific rules that the derive cannot express.
    pub fn check(&self) -> Result<(), PostValidationError> {
        if self.titre.trim().is_empty() || self.contenu.trim().is_empty() {
            return Err(PostValidationError::MissingTitleOrBody);
        }

        match &self.kind {
            PostKind::Cours | PostKind::Exercice { .. } => Ok(()),
            PostKind::Video { video_url } => {
                if video_url.trim().is_empty() {
                    Err(PostValidationError::MissingVideoUrl)
                } else {
                    Ok(())
                }
            }
            PostKind::Quiz {
                time_limit,
                questions,
                ..
            } => validate_quiz_authoring(questions, *time_limit).map_err(Into::into),
        }
    }

    pub fn normalized_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .flat_map(|entry| entry.split(','))
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSort {
    #[default]
    Date,
    #[serde(alias = "likes_count")]
    Likes,
    #[serde(alias = "vues_count")]
    Vues,
}

impl FeedSort {
    pub fn field(&self) -> &'static str {
        match self {
            FeedSort::Date => "date_creation",
            FeedSort::Likes => "likes_count",
            FeedSort::Vues => "vues_count",
        }
    }
}

/// Query params for the feed
#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    #[serde(rename = "type")]
    pub post_type: Option<PostType>,
    pub chapitre: Option<Chapter>,
    #[serde(default)]
    pub sort_by: FeedSort,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<UserProfile>,
    pub comments_count: u64,
    pub is_liked: bool,
}

#[derive(Debug, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<UserProfile>,
    pub uploads: Vec<Upload>,
    pub is_liked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_embed: Option<VideoEmbed>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: PostKind) -> CreatePostRequest {
        CreatePostRequest {
            titre: "Les dérivées".to_string(),
            contenu: "La dérivée de $x^2$ est $2x$.".to_string(),
            chapitre: Chapter::Analyse,
            tags: vec!["dérivée, fonction".to_string(), " ".to_string()],
            kind,
        }
    }

    #[test]
    fn post_kind_round_trips_through_flattened_record() {
        let json = serde_json::json!({
            "id": "p1",
            "titre": "Quiz",
            "contenu": "body",
            "chapitre": "algebre",
            "auteur_id": "u1",
            "date_creation": "2024-05-01T08:00:00.000Z",
            "likes_count": 3,
            "type": "quiz",
            "time_limit": 5,
            "questions": [
                {"id": "q1", "question": "1+1?", "options": ["1", "2"], "correctAnswer": 1}
            ]
        });

        let post: Post = serde_json::from_value(json).unwrap();
        assert_eq!(post.kind.post_type(), PostType::Quiz);
        assert!(post.actif);
        assert_eq!(post.likes_count, 3);
        match &post.kind {
            PostKind::Quiz {
                time_limit,
                questions,
                ..
            } => {
                assert_eq!(*time_limit, Some(5));
                assert_eq!(questions.len(), 1);
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let back = serde_json::to_value(&post).unwrap();
        assert_eq!(back["type"], "quiz");
        assert_eq!(back["chapitre"], "algebre");
    }

    #[test]
    fn video_requires_url() {
        let req = request(PostKind::Video {
            video_url: "   ".to_string(),
        });
        assert_eq!(req.check(), Err(PostValidationError::MissingVideoUrl));
    }

    #[test]
    fn quiz_requires_questions() {
        let req = request(PostKind::Quiz {
            difficulty: Some(Difficulty::Moyen),
            time_limit: None,
            questions: vec![],
        });
        assert_eq!(
            req.check(),
            Err(PostValidationError::Quiz(QuizValidationError::NoQuestions))
        );
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut req = request(PostKind::Cours);
        req.titre = "   ".to_string();
        assert_eq!(req.check(), Err(PostValidationError::MissingTitleOrBody));
    }

    #[test]
    fn tags_are_split_and_trimmed() {
        let req = request(PostKind::Cours);
        assert_eq!(req.normalized_tags(), vec!["dérivée", "fonction"]);
    }

    #[test]
    fn feed_sort_accepts_column_aliases() {
        let q: FeedQuery = serde_json::from_value(serde_json::json!({"sort_by": "likes_count"})).unwrap();
        assert_eq!(q.sort_by, FeedSort::Likes);
        assert_eq!(q.sort_by.field(), "likes_count");
    }
}
