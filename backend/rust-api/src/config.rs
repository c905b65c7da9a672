use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub server_addr: String,
    /// Real time per countdown step of a timed quiz
    pub quiz_tick_interval_ms: u64,
    pub quiz_session_idle_seconds: u64,
    pub feed_default_limit: u32,
    pub like_guard_ttl_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then the crate-local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml, overridden by APP__SECTION__KEY variables
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Self::local();

        let jwt_secret = match lookup(&settings, "auth.jwt_secret", "JWT_SECRET") {
            Some(secret) => secret,
            None if env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            None => {
                tracing::warn!("Using default JWT_SECRET (dev mode only!)");
                defaults.jwt_secret
            }
        };

        Ok(Config {
            mongo_uri: lookup(&settings, "database.mongo_uri", "MONGO_URI")
                .unwrap_or(defaults.mongo_uri),
            redis_uri: lookup(&settings, "redis.uri", "REDIS_URI").unwrap_or(defaults.redis_uri),
            mongo_database: lookup(&settings, "database.mongo_database", "MONGO_DATABASE")
                .unwrap_or(defaults.mongo_database),
            jwt_secret,
            server_addr: lookup(&settings, "server.addr", "SERVER_ADDR")
                .unwrap_or(defaults.server_addr),
            quiz_tick_interval_ms: parsed(
                &settings,
                "quiz.tick_interval_ms",
                "QUIZ_TICK_INTERVAL_MS",
            )?
            .unwrap_or(defaults.quiz_tick_interval_ms),
            quiz_session_idle_seconds: parsed(
                &settings,
                "quiz.session_idle_seconds",
                "QUIZ_SESSION_IDLE_SECONDS",
            )?
            .unwrap_or(defaults.quiz_session_idle_seconds),
            feed_default_limit: parsed(&settings, "feed.default_limit", "FEED_DEFAULT_LIMIT")?
                .unwrap_or(defaults.feed_default_limit),
            like_guard_ttl_ms: parsed(&settings, "engagement.like_guard_ttl_ms", "LIKE_GUARD_TTL_MS")?
                .unwrap_or(defaults.like_guard_ttl_ms),
        })
    }

    /// Defaults for a local developer machine and for tests.
    pub fn local() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            mongo_database: "mathmastery".to_string(),
            jwt_secret: "dev-secret-only-for-local-testing".to_string(),
            server_addr: "0.0.0.0:8081".to_string(),
            quiz_tick_interval_ms: 1000,
            quiz_session_idle_seconds: 3600,
            feed_default_limit: 20,
            like_guard_ttl_ms: 5000,
        }
    }
}

fn lookup(settings: &config::Config, key: &str, env_key: &str) -> Option<String> {
    settings
        .get_string(key)
        .ok()
        .or_else(|| env::var(env_key).ok())
        .filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(
    settings: &config::Config,
    key: &str,
    env_key: &str,
) -> Result<Option<T>, config::ConfigError>
where
    T::Err: std::fmt::Display,
{
    lookup(settings, key, env_key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                config::ConfigError::Message(format!("{} has an invalid value {:?}: {}", env_key, raw, e))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_overrides_numeric_settings() {
        env::set_var("SKIP_ROOT_ENV", "1");
        env::set_var("QUIZ_TICK_INTERVAL_MS", "250");
        env::set_var("FEED_DEFAULT_LIMIT", "10");

        let config = Config::load().unwrap();
        assert_eq!(config.quiz_tick_interval_ms, 250);
        assert_eq!(config.feed_default_limit, 10);
        assert_eq!(config.like_guard_ttl_ms, 5000);

        env::remove_var("QUIZ_TICK_INTERVAL_MS");
        env::remove_var("FEED_DEFAULT_LIMIT");
    }

    #[test]
    #[serial]
    fn rejects_malformed_numbers() {
        env::set_var("SKIP_ROOT_ENV", "1");
        env::set_var("LIKE_GUARD_TTL_MS", "soon");

        assert!(Config::load().is_err());

        env::remove_var("LIKE_GUARD_TTL_MS");
    }

    #[test]
    #[serial]
    fn production_requires_jwt_secret() {
        env::set_var("SKIP_ROOT_ENV", "1");
        env::set_var("APP_ENV", "prod");
        env::remove_var("JWT_SECRET");

        assert!(Config::load().is_err());

        env::remove_var("APP_ENV");
    }
}
