use axum::http::StatusCode;
use mathmastery_api::models::UserRole;
use serde_json::json;

mod common;

use common::{cours_post, create_test_app, token_for};

#[tokio::test]
async fn test_profile_creation_is_idempotent() {
    let app = create_test_app();
    let token = token_for("user-1", UserRole::Utilisateur);
    let body = json!({
        "email": "Ada@Example.com",
        "nom": "Lovelace",
        "prenom": "Ada",
        "bio": "Analyste",
    });

    let (status, created) = app
        .request("POST", "/api/v1/users/profile", Some(&token), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["created"], true);
    assert_eq!(created["user"]["id"], "user-1");
    assert_eq!(created["user"]["email"], "ada@example.com");
    assert_eq!(created["user"]["role"], "utilisateur");

    let (status, again) = app
        .request("POST", "/api/v1/users/profile", Some(&token), Some(body))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["created"], false);
    assert_eq!(
        again["user"]["date_inscription"],
        created["user"]["date_inscription"]
    );

    let (status, profile) = app.request("GET", "/api/v1/users/user-1", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["prenom"], "Ada");
}

#[tokio::test]
async fn test_profile_validation_and_missing_user() {
    let app = create_test_app();
    let token = token_for("user-1", UserRole::Utilisateur);

    let (status, json) = app
        .request(
            "POST",
            "/api/v1/users/profile",
            Some(&token),
            Some(json!({ "email": "not-an-email", "nom": "X", "prenom": "Y" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", json);

    let (status, _) = app
        .request(
            "POST",
            "/api/v1/users/profile",
            Some(&token),
            Some(json!({ "email": "x@example.com", "nom": "X" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app.request("GET", "/api/v1/users/ghost", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "User not found");
}

#[tokio::test]
async fn test_dashboard_totals_and_recent_posts() {
    let app = create_test_app();
    app.create_profile("author-1", "Emmy").await;
    let mut post_ids = Vec::new();
    for i in 0..6 {
        post_ids.push(
            app.create_post("author-1", cours_post(&format!("Chapitre {}", i)))
                .await,
        );
    }
    app.create_post("someone-else", cours_post("Autre")).await;

    let reader = token_for("reader-1", UserRole::Utilisateur);
    app.request(
        "POST",
        &format!("/api/v1/posts/{}/like", post_ids[0]),
        Some(&reader),
        None,
    )
    .await;
    app.request("GET", &format!("/api/v1/posts/{}", post_ids[1]), None, None)
        .await;
    app.request("GET", &format!("/api/v1/posts/{}", post_ids[1]), None, None)
        .await;

    let author = token_for("author-1", UserRole::Utilisateur);
    app.request(
        "POST",
        &format!("/api/v1/posts/{}/comments", post_ids[2]),
        Some(&author),
        Some(json!({ "contenu": "Précision" })),
    )
    .await;

    let (status, dashboard) = app
        .request("GET", "/api/v1/users/me/dashboard", Some(&author), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        dashboard["stats"],
        json!({
            "posts_count": 6,
            "likes_received": 1,
            "views_count": 2,
            "comments_count": 1,
        })
    );
    let recent = dashboard["recent_posts"].as_array().unwrap();
    assert_eq!(recent.len(), 5);
    assert!(recent.iter().all(|p| p["auteur_id"] == "author-1"));

    let (status, _) = app
        .request("GET", "/api/v1/users/me/dashboard", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
