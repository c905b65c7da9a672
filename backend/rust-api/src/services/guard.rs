//! Per-entity in-flight guard: at most one mutation at a time for a key.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::metrics::GUARD_OPERATIONS_TOTAL;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Another update for this item is already in progress")]
    Busy,
    #[error("guard backend error: {0}")]
    Backend(String),
}

/// Proof of a held guard, handed back on release.
#[derive(Debug)]
pub struct GuardTicket {
    key: String,
    token: String,
}

impl GuardTicket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
pub trait InFlightGuard: Send + Sync {
    /// Fails with `Busy` while another holder owns `key`.
    async fn try_acquire(&self, key: &str) -> Result<GuardTicket, GuardError>;

    async fn release(&self, ticket: GuardTicket);
}

/// A held guard that gives its key back when dropped, including when the
/// owning request future is cancelled mid-flight.
pub struct GuardLease {
    guard: Arc<dyn InFlightGuard>,
    ticket: Option<GuardTicket>,
}

impl GuardLease {
    pub async fn acquire(guard: Arc<dyn InFlightGuard>, key: &str) -> Result<Self, GuardError> {
        let ticket = guard.try_acquire(key).await?;
        Ok(Self {
            guard,
            ticket: Some(ticket),
        })
    }

    pub async fn release(mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.guard.release(ticket).await;
        }
    }
}

impl Drop for GuardLease {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("Releasing abandoned guard {}", ticket.key);
                let guard = self.guard.clone();
                handle.spawn(async move { guard.release(ticket).await });
            }
            Err(_) => tracing::warn!("Guard {} dropped outside a runtime", ticket.key),
        }
    }
}

pub fn like_key(user_id: &str, post_id: &str) -> String {
    format!("guard:like:{}:{}", user_id, post_id)
}

fn record(outcome: &str) {
    GUARD_OPERATIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Redis lock with a TTL, so a crashed holder cannot block the key forever.
pub struct RedisInFlightGuard {
    redis: ConnectionManager,
    ttl_ms: u64,
}

impl RedisInFlightGuard {
    pub fn new(redis: ConnectionManager, ttl_ms: u64) -> Self {
        Self { redis, ttl_ms }
    }
}

#[async_trait]
impl InFlightGuard for RedisInFlightGuard {
    async fn try_acquire(&self, key: &str) -> Result<GuardTicket, GuardError> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.redis.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| GuardError::Backend(e.to_string()))?;

        match reply {
            Some(_) => {
                record("acquired");
                Ok(GuardTicket {
                    key: key.to_string(),
                    token,
                })
            }
            None => {
                record("busy");
                Err(GuardError::Busy)
            }
        }
    }

    async fn release(&self, ticket: GuardTicket) {
        // Delete only if the lock still carries our token
        let lua_script = r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            end
            return 0
        "#;

        let mut conn = self.redis.clone();
        let result: Result<i32, redis::RedisError> = redis::Script::new(lua_script)
            .key(&ticket.key)
            .arg(&ticket.token)
            .invoke_async(&mut conn)
            .await;

        if let Err(e) = result {
            tracing::warn!("Failed to release guard {}: {}", ticket.key, e);
        }
    }
}

/// Process-local guard for tests and single-instance runs.
#[derive(Default)]
pub struct LocalInFlightGuard {
    held: Mutex<HashSet<String>>,
}

impl LocalInFlightGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InFlightGuard for LocalInFlightGuard {
    async fn try_acquire(&self, key: &str) -> Result<GuardTicket, GuardError> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| GuardError::Backend("guard lock poisoned".to_string()))?;

        if !held.insert(key.to_string()) {
            record("busy");
            return Err(GuardError::Busy);
        }
        record("acquired");
        Ok(GuardTicket {
            key: key.to_string(),
            token: String::new(),
        })
    }

    async fn release(&self, ticket: GuardTicket) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&ticket.key);
        }
    }
}
