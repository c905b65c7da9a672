#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use mathmastery_api::{
    config::Config, create_router, middlewares::auth::JwtClaims, middlewares::auth::JwtService,
    models::UserRole, services::AppState,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

pub fn test_config() -> Config {
    Config {
        quiz_tick_interval_ms: 20,
        ..Config::local()
    }
}

/// Router over the in-memory store and a process-local in-flight guard.
pub fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let state = Arc::new(AppState::in_memory(test_config()));
    TestApp {
        router: create_router(state.clone()),
        state,
    }
}

pub fn token_for(user_id: &str, role: UserRole) -> String {
    let config = test_config();
    JwtService::new(&config.jwt_secret)
        .generate_token(&JwtClaims::new(user_id, role, 3600))
        .expect("token")
}

impl TestApp {
    /// Sends one request and returns the status with the JSON body
    /// (`Value::Null` for empty bodies).
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                panic!(
                    "non-JSON body for {} {}: {}",
                    method,
                    uri,
                    String::from_utf8_lossy(&bytes)
                )
            })
        };
        (status, json)
    }

    pub async fn create_profile(&self, user_id: &str, prenom: &str) {
        let token = token_for(user_id, UserRole::Utilisateur);
        let (status, _) = self
            .request(
                "POST",
                "/api/v1/users/profile",
                Some(&token),
                Some(json!({
                    "email": format!("{}@example.com", user_id),
                    "nom": "Test",
                    "prenom": prenom,
                })),
            )
            .await;
        assert!(status == StatusCode::CREATED || status == StatusCode::OK);
    }

    /// Creates a post as `author_id` and returns its id.
    pub async fn create_post(&self, author_id: &str, body: Value) -> String {
        let token = token_for(author_id, UserRole::Utilisateur);
        let (status, json) = self
            .request("POST", "/api/v1/posts", Some(&token), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create post failed: {}", json);
        json["id"].as_str().expect("post id").to_string()
    }
}

pub fn cours_post(titre: &str) -> Value {
    json!({
        "titre": titre,
        "contenu": "La dérivée de $x^2$ est $2x$.",
        "chapitre": "analyse",
        "tags": ["dérivée, fonction"],
        "type": "cours",
    })
}

/// Three questions; the correct options are 1, 0 and 2.
pub fn quiz_post(time_limit: Option<u32>) -> Value {
    let mut post = json!({
        "titre": "Quiz sur les dérivées",
        "contenu": "Testez vos connaissances.",
        "chapitre": "analyse",
        "type": "quiz",
        "difficulty": "moyen",
        "questions": [
            {
                "id": "q1",
                "question": "Dérivée de $x^2$ ?",
                "options": ["$x$", "$2x$", "$x^2$"],
                "correctAnswer": 1,
                "explanation": "On abaisse l'exposant."
            },
            {
                "id": "q2",
                "question": "Dérivée d'une constante ?",
                "options": ["0", "1", "la constante"],
                "correctAnswer": 0
            },
            {
                "id": "q3",
                "question": "Dérivée de $e^x$ ?",
                "options": ["$x e^{x-1}$", "$\\ln x$", "$e^x$"],
                "correctAnswer": 2
            }
        ]
    });
    if let Some(minutes) = time_limit {
        post["time_limit"] = json!(minutes);
    }
    post
}
