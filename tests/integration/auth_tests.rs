//! Authentication integration tests.
//!
//! Tests verify:
//! - Protected routes redirect anonymous visitors before the handler runs
//! - The session token is renewed on login and logout
//! - Guest-only pages redirect authenticated users
//! - Signup and login failures re-render with 422

use std::str::FromStr;

use axum::http::StatusCode;

use snippetbox::session::{SessionId, SessionStore};

use super::test_utils::{TestApp, TEST_PASSWORD};

fn session_id(token: &str) -> SessionId {
    SessionId::from_str(token).expect("session cookie holds a session id")
}

// =============================================================================
// Gate
// =============================================================================

#[tokio::test]
async fn test_anonymous_create_form_redirects_to_login() {
    let app = TestApp::new();
    let response = app.get("/snippet/views").await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
    assert!(!response.body.contains("Publish snippet"));
}

#[tokio::test]
async fn test_anonymous_create_post_is_not_executed() {
    let app = TestApp::new();
    let response = app
        .submit(
            "/snippet/views",
            &[("title", "Sneaky"), ("content", "Nope"), ("expires", "7")],
        )
        .await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
    assert!(app.snippets.is_empty().await);
}

#[tokio::test]
async fn test_anonymous_logout_redirects_to_login() {
    let app = TestApp::new();
    let response = app.submit("/user/logout", &[]).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
}

#[tokio::test]
async fn test_protected_page_for_authenticated_user() {
    let app = TestApp::new();
    app.authenticated().await;

    let response = app.get("/snippet/views").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Publish snippet"));
    assert!(response.body.contains("Logout"));
    assert_eq!(response.header("cache-control"), Some("no-store"));
}

#[tokio::test]
async fn test_public_page_is_cacheable() {
    let app = TestApp::new();
    app.authenticated().await;

    let response = app.get("/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.headers.get("cache-control").is_none());
}

#[tokio::test]
async fn test_authenticated_user_is_redirected_away_from_login() {
    let app = TestApp::new();
    app.authenticated().await;

    for uri in ["/user/login", "/user/signup"] {
        let response = app.get(uri).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(response.location(), Some("/"));
    }
}

// =============================================================================
// Token Renewal
// =============================================================================

#[tokio::test]
async fn test_login_renews_session_token() {
    let app = TestApp::new();
    let response = app.signup("Alice", "alice@example.com", TEST_PASSWORD).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));

    let before = app.session_token().expect("session issued before login");

    let response = app.login("alice@example.com", TEST_PASSWORD).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/snippet/views"));

    let after = app.session_token().unwrap();
    assert_ne!(before, after);
    assert!(app.sessions.load(&session_id(&before)).await.unwrap().is_none());
    assert!(app.sessions.load(&session_id(&after)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_logout_renews_token_and_flashes_once() {
    let app = TestApp::new();
    app.authenticated().await;
    let before = app.session_token().unwrap();

    let response = app.submit("/user/logout", &[]).await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/"));

    let after = app.session_token().unwrap();
    assert_ne!(before, after);
    assert!(app.sessions.load(&session_id(&before)).await.unwrap().is_none());

    let response = app.get("/").await;
    assert!(response.body.contains("logged out successfully"));
    assert!(response.body.contains("Login"));

    let response = app.get("/").await;
    assert!(!response.body.contains("logged out successfully"));

    let response = app.get("/snippet/views").await;
    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
}

#[tokio::test]
async fn test_stolen_old_token_is_useless_after_login() {
    let app = TestApp::new();
    app.signup("Alice", "alice@example.com", TEST_PASSWORD).await;
    let before = app.session_token().unwrap();
    app.login("alice@example.com", TEST_PASSWORD).await;

    app.set_cookie("session", &before);
    let response = app.get("/snippet/views").await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/user/login"));
}

// =============================================================================
// Signup and Login Forms
// =============================================================================

#[tokio::test]
async fn test_signup_flash_shown_on_login_page() {
    let app = TestApp::new();
    app.signup("Alice", "alice@example.com", TEST_PASSWORD).await;

    let response = app.get("/user/login").await;
    assert!(response.body.contains("Your signup was successful. Please log in."));
}

#[tokio::test]
async fn test_duplicate_signup_rejected() {
    let app = TestApp::new();
    app.signup("Alice", "alice@example.com", TEST_PASSWORD).await;

    let response = app.signup("Alice", "alice@example.com", TEST_PASSWORD).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Email address is already in use"));
    assert!(response.body.contains("alice@example.com"));
    assert!(!response.body.contains(TEST_PASSWORD));
    assert_eq!(app.users.len().await, 1);
}

#[tokio::test]
async fn test_invalid_signup_fields() {
    let app = TestApp::new();
    let response = app.signup("", "not-an-email", "short").await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("This field cannot be blank"));
    assert!(app.users.is_empty().await);
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let app = TestApp::new();
    app.signup("Alice", "alice@example.com", TEST_PASSWORD).await;
    let before = app.session_token().unwrap();

    let response = app.login("alice@example.com", "wrong-password").await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body.contains("Email or password is incorrect"));
    assert_eq!(app.session_token().unwrap(), before);
}
