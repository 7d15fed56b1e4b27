//! Snippet integration tests.
//!
//! Tests verify:
//! - Creating a snippet redirects to its page and flashes once
//! - Invalid submissions re-render with errors and store nothing
//! - Expired and unknown snippets are not found

use axum::http::StatusCode;
use time::{Duration, OffsetDateTime};

use super::test_utils::TestApp;

#[tokio::test]
async fn test_create_snippet_and_view_it() {
    let app = TestApp::new();
    app.authenticated().await;

    let response = app
        .submit(
            "/snippet/views",
            &[
                ("title", "An old silent pond"),
                ("content", "A frog jumps into the pond,\nsplash! Silence again."),
                ("expires", "7"),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/snippet/views/1"));
    assert_eq!(app.snippets.len().await, 1);

    let response = app.get("/snippet/views/1").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("An old silent pond"));
    assert!(response.body.contains("Snippet successfully created!"));

    let response = app.get("/snippet/views/1").await;
    assert!(!response.body.contains("Snippet successfully created!"));
}

#[tokio::test]
async fn test_snippet_view_is_public() {
    let app = TestApp::new();
    let id = app
        .seed_snippet("Public haiku", OffsetDateTime::now_utc() + Duration::days(7))
        .await;

    let response = app.get(&format!("/snippet/views/{id}")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Public haiku"));
    assert!(response.body.contains(&format!("#{id}")));
}

#[tokio::test]
async fn test_snippet_content_is_escaped() {
    let app = TestApp::new();
    app.authenticated().await;

    app.submit(
        "/snippet/views",
        &[
            ("title", "<script>alert(1)</script>"),
            ("content", "body"),
            ("expires", "1"),
        ],
    )
    .await;

    let response = app.get("/snippet/views/1").await;
    assert!(!response.body.contains("<script>alert(1)</script>"));
    assert!(response.body.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn test_invalid_expiry_rerenders_form() {
    let app = TestApp::new();
    app.authenticated().await;

    let response = app
        .submit(
            "/snippet/views",
            &[("title", "Kept title"), ("content", "Kept content"), ("expires", "30")],
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("This field must equal 1, 7 or 365"));
    assert!(response.body.contains("value=\"Kept title\""));
    assert!(response.body.contains("Kept content"));
    assert!(app.snippets.is_empty().await);
}

#[tokio::test]
async fn test_blank_fields_rerender_form() {
    let app = TestApp::new();
    app.authenticated().await;

    let response = app
        .submit(
            "/snippet/views",
            &[("title", ""), ("content", "   "), ("expires", "365")],
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("This field cannot be blank"));
    assert!(app.snippets.is_empty().await);
}

#[tokio::test]
async fn test_expired_snippet_is_hidden() {
    let app = TestApp::new();
    let live = app
        .seed_snippet("Still here", OffsetDateTime::now_utc() + Duration::days(1))
        .await;
    let expired = app
        .seed_snippet("Long gone", OffsetDateTime::now_utc() - Duration::minutes(1))
        .await;

    let response = app.get(&format!("/snippet/views/{expired}")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.get(&format!("/snippet/views/{live}")).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.get("/").await;
    assert!(response.body.contains("Still here"));
    assert!(!response.body.contains("Long gone"));
}

#[tokio::test]
async fn test_home_page_without_snippets() {
    let app = TestApp::new();
    let response = app.get("/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("nothing to see here... yet!"));
}

#[tokio::test]
async fn test_unknown_or_malformed_ids_are_not_found() {
    let app = TestApp::new();

    for uri in [
        "/snippet/views/999999",
        "/snippet/views/0",
        "/snippet/views/-1",
        "/snippet/views/abc",
        "/snippet/views/%FF",
    ] {
        let response = app.get(uri).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{uri}");
    }
}
