use crate::config::Config;
use crate::store::{ContentStore, InMemoryContentStore, MongoContentStore, StoreError};
use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use guard::{GuardError, InFlightGuard, LocalInFlightGuard, RedisInFlightGuard};
use quiz_engine::QuizError;
use quiz_service::QuizSessionRegistry;

pub mod comment_service;
pub mod engagement_service;
pub mod guard;
pub mod post_service;
pub mod quiz_engine;
pub mod quiz_service;
pub mod user_service;

/// Errors shared by the service layer; handlers turn them into `ApiError`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Guard(#[from] GuardError),
}

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ContentStore>,
    pub guard: Arc<dyn InFlightGuard>,
    pub quizzes: Arc<QuizSessionRegistry>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let store = MongoContentStore::new(mongo_client.database(&config.mongo_database));
        store.ensure_indexes().await?;

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let mut conn = redis.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        let quizzes = Arc::new(QuizSessionRegistry::from_config(&config));
        quizzes.spawn_sweeper();

        Ok(Self {
            guard: Arc::new(RedisInFlightGuard::new(redis, config.like_guard_ttl_ms)),
            store: Arc::new(store),
            quizzes,
            config,
        })
    }

    /// State over the in-memory store and a process-local guard. No
    /// background sweeper is started; callers evict explicitly.
    pub fn in_memory(config: Config) -> Self {
        Self {
            store: Arc::new(InMemoryContentStore::new()),
            guard: Arc::new(LocalInFlightGuard::new()),
            quizzes: Arc::new(QuizSessionRegistry::from_config(&config)),
            config,
        }
    }
}
