use axum::{
    http::{header, Method},
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    let api = public_routes(app_state.clone())
        .merge(protected_routes(app_state.clone()))
        .merge(admin_routes(app_state.clone()));

    Router::new()
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1", api)
        .with_state(app_state)
        // gzip when asked for; event streams are left uncompressed
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Read routes and quiz attempts: anonymous allowed, a valid token attaches
/// the caller's claims.
fn public_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts", get(handlers::posts::list_feed))
        .route("/posts/{id}", get(handlers::posts::get_post))
        .route("/posts/{id}/share", post(handlers::posts::share_post))
        .route("/posts/{id}/counters", get(handlers::posts::get_counters))
        .route(
            "/posts/{id}/comments",
            get(handlers::comments::list_comments),
        )
        .route("/users/{id}", get(handlers::users::get_profile))
        // Quiz sessions
        .route("/quiz-sessions", post(handlers::quiz::create_session))
        .route(
            "/quiz-sessions/{id}",
            get(handlers::quiz::get_session).delete(handlers::quiz::delete_session),
        )
        .route(
            "/quiz-sessions/{id}/start",
            post(handlers::quiz::start_session),
        )
        .route(
            "/quiz-sessions/{id}/answers",
            post(handlers::quiz::select_answer),
        )
        .route(
            "/quiz-sessions/{id}/advance",
            post(handlers::quiz::advance_session),
        )
        .route(
            "/quiz-sessions/{id}/restart",
            post(handlers::quiz::restart_session),
        )
        .route("/quiz-sessions/{id}/result", get(handlers::quiz::get_result))
        .route(
            "/quiz-sessions/{id}/stream",
            get(handlers::sse::quiz_session_stream),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::optional_auth_middleware,
        ))
}

fn protected_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts", post(handlers::posts::create_post))
        .route("/posts/{id}", delete(handlers::posts::delete_post))
        .route("/posts/{id}/like", post(handlers::posts::toggle_like))
        .route("/posts/{id}/comments", post(handlers::comments::add_comment))
        .route(
            "/comments/{id}",
            patch(handlers::comments::update_comment).delete(handlers::comments::delete_comment),
        )
        .route("/users/profile", post(handlers::users::create_profile))
        .route("/users/me/dashboard", get(handlers::users::dashboard))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn admin_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/posts/{id}/counters/reconcile",
            post(handlers::posts::reconcile_counters),
        )
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}
