use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    response::Response,
};
use mathmastery_api::models::UserRole;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

use common::{create_test_app, quiz_post, token_for, TestApp};

async fn new_session(app: &TestApp, token: Option<&str>, time_limit: Option<u32>) -> String {
    let post_id = app.create_post("author-1", quiz_post(time_limit)).await;
    let (status, json) = app
        .request(
            "POST",
            "/api/v1/quiz-sessions",
            token,
            Some(json!({ "post_id": post_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", json);
    assert_eq!(json["phase"], "not_started");
    assert_eq!(json["total_questions"], 3);
    json["session_id"].as_str().unwrap().to_string()
}

async fn answer(app: &TestApp, session_id: &str, question_id: &str, option: usize) -> Value {
    let (status, json) = app
        .request(
            "POST",
            &format!("/api/v1/quiz-sessions/{}/answers", session_id),
            None,
            Some(json!({ "question_id": question_id, "option_index": option })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    json
}

async fn advance(app: &TestApp, session_id: &str) -> (StatusCode, Value) {
    app.request(
        "POST",
        &format!("/api/v1/quiz-sessions/{}/advance", session_id),
        None,
        None,
    )
    .await
}

async fn open_stream(app: &TestApp, session_id: &str) -> Response {
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/quiz-sessions/{}/stream", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    response
}

/// Whole stream body; fails if the server keeps the stream open
async fn read_stream(response: Response) -> String {
    let body = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .expect("stream should be closed by the server")
    .unwrap();
    String::from_utf8_lossy(&body).into_owned()
}

async fn start(app: &TestApp, session_id: &str) -> Value {
    let (status, json) = app
        .request(
            "POST",
            &format!("/api/v1/quiz-sessions/{}/start", session_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    json
}

#[tokio::test]
async fn test_full_attempt_scores_two_of_three() {
    let app = create_test_app();
    let session_id = new_session(&app, None, None).await;

    let (status, started) = app
        .request(
            "POST",
            &format!("/api/v1/quiz-sessions/{}/start", session_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["phase"], "in_progress");
    assert_eq!(started["current_question"]["id"], "q1");
    // The correct option is never sent to the client
    assert!(started["current_question"].get("correctAnswer").is_none());

    for (question_id, option) in [("q1", 1), ("q2", 0), ("q3", 0)] {
        let view = answer(&app, &session_id, question_id, option).await;
        assert_eq!(view["can_advance"], true);
        let (status, _) = advance(&app, &session_id).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, result) = app
        .request(
            "GET",
            &format!("/api/v1/quiz-sessions/{}/result", session_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["score"], 2);
    assert_eq!(result["total"], 3);
    assert_eq!(result["percentage"], 67);
    assert_eq!(result["review"][2]["is_correct"], false);
    assert_eq!(result["review"][2]["options"][0]["verdict"], "incorrect_and_chosen");
    assert_eq!(result["review"][2]["options"][2]["verdict"], "correct_not_chosen");
}

#[tokio::test]
async fn test_advance_requires_an_answer() {
    let app = create_test_app();
    let session_id = new_session(&app, None, None).await;

    let (status, _) = advance(&app, &session_id).await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.request(
        "POST",
        &format!("/api/v1/quiz-sessions/{}/start", session_id),
        None,
        None,
    )
    .await;

    let (status, json) = advance(&app, &session_id).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["status"], 422);
}

#[tokio::test]
async fn test_reselecting_keeps_latest_answer() {
    let app = create_test_app();
    let session_id = new_session(&app, None, None).await;
    app.request(
        "POST",
        &format!("/api/v1/quiz-sessions/{}/start", session_id),
        None,
        None,
    )
    .await;

    answer(&app, &session_id, "q1", 0).await;
    let view = answer(&app, &session_id, "q1", 2).await;
    assert_eq!(view["selected_option"], 2);
    assert_eq!(view["answered_count"], 1);

    let (status, json) = app
        .request(
            "POST",
            &format!("/api/v1/quiz-sessions/{}/answers", session_id),
            None,
            Some(json!({ "question_id": "q1", "option_index": 7 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", json);

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/v1/quiz-sessions/{}/answers", session_id),
            None,
            Some(json!({ "question_id": "q3", "option_index": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_restart_resets_attempt() {
    let app = create_test_app();
    let session_id = new_session(&app, None, None).await;
    app.request(
        "POST",
        &format!("/api/v1/quiz-sessions/{}/start", session_id),
        None,
        None,
    )
    .await;
    answer(&app, &session_id, "q1", 1).await;
    advance(&app, &session_id).await;

    let (status, view) = app
        .request(
            "POST",
            &format!("/api/v1/quiz-sessions/{}/restart", session_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["phase"], "not_started");
    assert_eq!(view["current_question_index"], 0);
    assert_eq!(view["answered_count"], 0);

    let (status, _) = app
        .request(
            "GET",
            &format!("/api/v1/quiz-sessions/{}/result", session_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_session_for_non_quiz_post_is_rejected() {
    let app = create_test_app();
    let post_id = app
        .create_post("author-1", common::cours_post("Les limites"))
        .await;

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/quiz-sessions",
            None,
            Some(json!({ "post_id": post_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/quiz-sessions",
            None,
            Some(json!({ "post_id": "missing" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_owned_session_is_private() {
    let app = create_test_app();
    let owner = token_for("student-1", UserRole::Utilisateur);
    let other = token_for("student-2", UserRole::Utilisateur);
    let session_id = new_session(&app, Some(&owner), None).await;
    let uri = format!("/api/v1/quiz-sessions/{}", session_id);

    let (status, _) = app.request("GET", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.request("GET", &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.request("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.request("DELETE", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.request("GET", &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(app.state.quizzes.is_empty().await);
}

#[tokio::test]
async fn test_untimed_session_has_no_stream() {
    let app = create_test_app();
    let session_id = new_session(&app, None, None).await;

    let (status, _) = app
        .request(
            "GET",
            &format!("/api/v1/quiz-sessions/{}/stream", session_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_timed_session_streams_until_expiry() {
    let app = create_test_app();
    let session_id = new_session(&app, None, Some(1)).await;

    let started = start(&app, &session_id).await;
    assert_eq!(started["time_left_seconds"], 60);

    let text = read_stream(open_stream(&app, &session_id).await).await;
    assert!(text.contains("event: timer-tick"));
    assert!(text.contains("event: time-expired"));

    let (_, view) = app
        .request(
            "GET",
            &format!("/api/v1/quiz-sessions/{}", session_id),
            None,
            None,
        )
        .await;
    assert_eq!(view["phase"], "finished");
    assert_eq!(view["time_left_seconds"], 0);

    let (status, result) = app
        .request(
            "GET",
            &format!("/api/v1/quiz-sessions/{}/result", session_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["score"], 0);
    assert_eq!(result["percentage"], 0);
}

#[tokio::test]
async fn test_finishing_timed_attempt_closes_stream() {
    let app = create_test_app();
    let session_id = new_session(&app, None, Some(5)).await;
    start(&app, &session_id).await;
    let response = open_stream(&app, &session_id).await;

    for (question_id, option) in [("q1", 1), ("q2", 0), ("q3", 2)] {
        answer(&app, &session_id, question_id, option).await;
        let (status, _) = advance(&app, &session_id).await;
        assert_eq!(status, StatusCode::OK);
    }

    let text = read_stream(response).await;
    assert!(text.contains("event: quiz-finished"), "{}", text);
    assert!(text.contains(r#""percentage":100"#), "{}", text);
    assert!(!text.contains("event: time-expired"));

    // Nothing left to follow on a finished attempt
    let (status, _) = app
        .request(
            "GET",
            &format!("/api/v1/quiz-sessions/{}/stream", session_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_restart_closes_stream() {
    let app = create_test_app();
    let session_id = new_session(&app, None, Some(5)).await;
    start(&app, &session_id).await;
    let response = open_stream(&app, &session_id).await;

    let (status, view) = app
        .request(
            "POST",
            &format!("/api/v1/quiz-sessions/{}/restart", session_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["phase"], "not_started");

    let text = read_stream(response).await;
    assert!(text.contains("event: quiz-reset"), "{}", text);

    // A new attempt can be followed again
    start(&app, &session_id).await;
    let response = open_stream(&app, &session_id).await;
    app.request(
        "DELETE",
        &format!("/api/v1/quiz-sessions/{}", session_id),
        None,
        None,
    )
    .await;
    read_stream(response).await;
}
