use std::time::Duration;

/// Exponential backoff with optional random jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            jitter_max: Some(Duration::from_millis(50)),
        }
    }
}

impl RetryConfig {
    /// Short budget for idempotent store reads issued on the request path
    pub fn store_reads() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(200),
            jitter_max: Some(Duration::from_millis(25)),
        }
    }

    fn jitter(&self) -> Duration {
        match self.jitter_max {
            Some(max) if !max.is_zero() => {
                let max_ms = max.as_millis() as u64;
                Duration::from_millis(rand::random::<u64>() % (max_ms + 1))
            }
            _ => Duration::ZERO,
        }
    }
}

/// Runs `f` until it succeeds or `max_attempts` calls have failed; the last
/// error is returned. Only use for operations that are safe to repeat.
pub async fn retry_async_with_config<F, Fut, T, E>(config: RetryConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts_left = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left -= 1;
                if attempts_left == 0 {
                    return Err(e);
                }

                tracing::debug!(
                    "Retrying after error ({} attempts left): {}",
                    attempts_left,
                    e
                );
                tokio::time::sleep(backoff + config.jitter()).await;
                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}
