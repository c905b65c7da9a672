use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use mathmastery_api::models::UserRole;
use serde_json::json;
use tower::ServiceExt;

mod common;

use common::{cours_post, create_test_app, quiz_post, token_for};

#[tokio::test]
async fn test_create_post_normalizes_and_starts_counters_at_zero() {
    let app = create_test_app();
    let token = token_for("author-1", UserRole::Utilisateur);

    let (status, post) = app
        .request("POST", "/api/v1/posts", Some(&token), Some(cours_post("  Les dérivées ")))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(post["titre"], "Les dérivées");
    assert_eq!(post["type"], "cours");
    assert_eq!(post["tags"], json!(["dérivée", "fonction"]));
    assert_eq!(post["auteur_id"], "author-1");
    assert_eq!(post["likes_count"], 0);
    assert_eq!(post["officiel"], false);
    assert_eq!(post["actif"], true);

    let admin = token_for("admin-1", UserRole::Admin);
    let (_, official) = app
        .request("POST", "/api/v1/posts", Some(&admin), Some(cours_post("Annonce")))
        .await;
    assert_eq!(official["officiel"], true);
}

#[tokio::test]
async fn test_invalid_posts_are_rejected() {
    let app = create_test_app();
    let token = token_for("author-1", UserRole::Utilisateur);

    let (status, _) = app
        .request("POST", "/api/v1/posts", None, Some(cours_post("Anonyme")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut blank = cours_post("Titre");
    blank["contenu"] = json!("   ");
    let (status, _) = app
        .request("POST", "/api/v1/posts", Some(&token), Some(blank))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let video = json!({
        "titre": "Vidéo",
        "contenu": "Regardez",
        "chapitre": "geometrie",
        "type": "video",
        "video_url": " ",
    });
    let (status, _) = app
        .request("POST", "/api/v1/posts", Some(&token), Some(video))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_quiz = quiz_post(None);
    bad_quiz["questions"][1]["correctAnswer"] = json!(9);
    let (status, json) = app
        .request("POST", "/api/v1/posts", Some(&token), Some(bad_quiz))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", json);

    let (status, _) = app
        .request("POST", "/api/v1/posts", Some(&token), Some(quiz_post(Some(0))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut empty_quiz = quiz_post(None);
    empty_quiz["questions"] = json!([]);
    let (status, _) = app
        .request("POST", "/api/v1/posts", Some(&token), Some(empty_quiz))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_post_detail_includes_author_and_video_embed() {
    let app = create_test_app();
    app.create_profile("author-1", "Ada").await;
    let post_id = app
        .create_post(
            "author-1",
            json!({
                "titre": "Le cercle",
                "contenu": "Périmètre et aire.",
                "chapitre": "geometrie",
                "type": "video",
                "video_url": "https://youtu.be/dQw4w9WgXcQ",
            }),
        )
        .await;

    let (status, detail) = app
        .request("GET", &format!("/api/v1/posts/{}", post_id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["author"]["prenom"], "Ada");
    assert_eq!(detail["vues_count"], 1);
    assert_eq!(detail["is_liked"], false);
    assert_eq!(detail["uploads"], json!([]));
    assert_eq!(detail["video_embed"]["provider"], "youtube");
    assert_eq!(
        detail["video_embed"]["embed_url"],
        "https://www.youtube.com/embed/dQw4w9WgXcQ"
    );
}

#[tokio::test]
async fn test_feed_filters_and_sorts() {
    let app = create_test_app();
    let first = app.create_post("author-1", cours_post("Premier")).await;
    let second = app.create_post("author-2", cours_post("Second")).await;
    let quiz = app.create_post("author-1", quiz_post(None)).await;

    let reader = token_for("reader-1", UserRole::Utilisateur);
    app.request(
        "POST",
        &format!("/api/v1/posts/{}/like", first),
        Some(&reader),
        None,
    )
    .await;

    let (status, feed) = app.request("GET", "/api/v1/posts", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = feed
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&second.as_str()));

    let (_, quizzes) = app
        .request("GET", "/api/v1/posts?type=quiz", None, None)
        .await;
    assert_eq!(quizzes.as_array().unwrap().len(), 1);
    assert_eq!(quizzes[0]["id"], quiz);

    let (_, by_likes) = app
        .request("GET", "/api/v1/posts?sort_by=likes&limit=1", Some(&reader), None)
        .await;
    assert_eq!(by_likes.as_array().unwrap().len(), 1);
    assert_eq!(by_likes[0]["id"], first);
    assert_eq!(by_likes[0]["is_liked"], true);

    let (status, _) = app
        .request("GET", "/api/v1/posts?sort_by=popularity", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_only_author_or_admin_deletes_post() {
    let app = create_test_app();
    let post_id = app.create_post("author-1", cours_post("À supprimer")).await;
    let uri = format!("/api/v1/posts/{}", post_id);

    let stranger = token_for("stranger", UserRole::Utilisateur);
    let (status, _) = app.request("DELETE", &uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = token_for("admin-1", UserRole::Admin);
    let (status, _) = app.request("DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.request("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, feed) = app.request("GET", "/api/v1/posts", None, None).await;
    assert!(feed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_comment_threads() {
    let app = create_test_app();
    app.create_profile("reader-1", "Emmy").await;
    let post_id = app.create_post("author-1", cours_post("Les matrices")).await;
    let uri = format!("/api/v1/posts/{}/comments", post_id);
    let reader = token_for("reader-1", UserRole::Utilisateur);
    let author = token_for("author-1", UserRole::Utilisateur);

    let (status, top) = app
        .request("POST", &uri, Some(&reader), Some(json!({ "contenu": " Merci ! " })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(top["contenu"], "Merci !");
    let top_id = top["id"].as_str().unwrap().to_string();

    let (status, reply) = app
        .request(
            "POST",
            &uri,
            Some(&author),
            Some(json!({ "contenu": "Avec plaisir", "parent_id": top_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let reply_id = reply["id"].as_str().unwrap().to_string();

    // Replies stay one level deep
    let (status, _) = app
        .request(
            "POST",
            &uri,
            Some(&reader),
            Some(json!({ "contenu": "Et encore", "parent_id": reply_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, threads) = app.request("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(threads.as_array().unwrap().len(), 1);
    assert_eq!(threads[0]["author"]["prenom"], "Emmy");
    assert_eq!(threads[0]["replies"][0]["contenu"], "Avec plaisir");

    let (status, _) = app
        .request("POST", &uri, Some(&reader), Some(json!({ "contenu": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_comment_edit_and_cascade_delete() {
    let app = create_test_app();
    let post_id = app.create_post("author-1", cours_post("Les matrices")).await;
    let uri = format!("/api/v1/posts/{}/comments", post_id);
    let reader = token_for("reader-1", UserRole::Utilisateur);
    let author = token_for("author-1", UserRole::Utilisateur);

    let (_, top) = app
        .request("POST", &uri, Some(&reader), Some(json!({ "contenu": "Question" })))
        .await;
    let top_id = top["id"].as_str().unwrap().to_string();
    app.request(
        "POST",
        &uri,
        Some(&author),
        Some(json!({ "contenu": "Réponse", "parent_id": top_id })),
    )
    .await;

    let comment_uri = format!("/api/v1/comments/{}", top_id);
    let (status, _) = app
        .request(
            "PATCH",
            &comment_uri,
            Some(&author),
            Some(json!({ "contenu": "Piraté" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, edited) = app
        .request(
            "PATCH",
            &comment_uri,
            Some(&reader),
            Some(json!({ "contenu": "Question précise" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["contenu"], "Question précise");
    assert!(edited["date_modification"].is_string());

    let (status, _) = app
        .request("DELETE", &comment_uri, Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, threads) = app.request("GET", &uri, None, None).await;
    assert!(threads.as_array().unwrap().is_empty());

    let (status, _) = app
        .request("DELETE", &comment_uri, Some(&reader), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_feed_is_gzipped_when_client_accepts_it() {
    let app = create_test_app();
    app.create_post("author-1", cours_post("Les intégrales")).await;

    let feed_request = |encoding: Option<&str>| {
        let mut builder = Request::builder().uri("/api/v1/posts");
        if let Some(encoding) = encoding {
            builder = builder.header(header::ACCEPT_ENCODING, encoding);
        }
        builder.body(Body::empty()).unwrap()
    };

    let response = app
        .router
        .clone()
        .oneshot(feed_request(Some("gzip")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");

    let response = app.router.clone().oneshot(feed_request(None)).await.unwrap();
    assert!(response.headers().get(header::CONTENT_ENCODING).is_none());
}
