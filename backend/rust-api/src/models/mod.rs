pub mod comment;
pub mod engagement;
pub mod post;
pub mod quiz;
pub mod quiz_event;
pub mod upload;
pub mod user;

pub use comment::{
    Comment, CommentThread, CommentWithAuthor, CreateCommentRequest, UpdateCommentRequest,
};
pub use engagement::{
    CounterSnapshot, LikeMembership, LikeToggleResponse, ReconcileResponse, ShareResponse,
};
pub use post::{
    Chapter, CreatePostRequest, FeedItem, FeedQuery, FeedSort, Post, PostDetail, PostKind,
    PostType, PostValidationError,
};
pub use quiz::{
    CreateQuizSessionRequest, QuizPhase, QuizQuestion, QuizResultView, QuizScore,
    QuizSessionView, SelectAnswerRequest,
};
pub use upload::{Upload, UploadType};
pub use user::{
    CreateProfileRequest, CreateProfileResponse, Dashboard, DashboardStats, UserProfile, UserRole,
};
