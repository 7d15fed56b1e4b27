//! CSRF integration tests.
//!
//! Tests verify:
//! - State-changing requests without a matching token are rejected with 400
//! - Rejected requests cause no store mutation
//! - A rejected request from a fresh visitor creates no session
//! - Tokens are embedded in forms and stable across requests and login

use axum::http::{Method, StatusCode};

use snippetbox::server::{CSRF_COOKIE, CSRF_HEADER};

use super::test_utils::{TestApp, TEST_PASSWORD};

const SNIPPET: [(&str, &str); 3] = [
    ("title", "Forged"),
    ("content", "Should never be stored"),
    ("expires", "7"),
];

#[tokio::test]
async fn test_get_issues_cookie_and_hidden_field() {
    let app = TestApp::new();
    let response = app.get("/user/signup").await;
    assert_eq!(response.status, StatusCode::OK);

    let token = app.cookie(CSRF_COOKIE).expect("csrf cookie");
    assert_eq!(token.len(), 64);
    assert!(response
        .body
        .contains(&format!("name=\"csrf_token\" value=\"{token}\"")));

    let cookie = response
        .headers
        .get_all("set-cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("csrf_token="))
        .unwrap()
        .to_string();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Secure"));
}

#[tokio::test]
async fn test_token_is_stable_across_requests() {
    let app = TestApp::new();
    app.get("/").await;
    let first = app.cookie(CSRF_COOKIE).unwrap();

    let response = app.get("/user/login").await;
    assert!(response.headers.get_all("set-cookie").iter().all(|value| {
        !value.to_str().unwrap().starts_with("csrf_token=")
    }));
    assert_eq!(app.cookie(CSRF_COOKIE).unwrap(), first);
}

#[tokio::test]
async fn test_post_without_token_is_rejected_before_handler() {
    let app = TestApp::new();
    app.authenticated().await;

    let response = app.post_form("/snippet/views", &SNIPPET).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.snippets.is_empty().await);
}

#[tokio::test]
async fn test_post_with_forged_token_is_rejected() {
    let app = TestApp::new();
    app.authenticated().await;

    let mut fields = SNIPPET.to_vec();
    fields.push(("csrf_token", "forged"));
    let response = app.post_form("/snippet/views", &fields).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.snippets.is_empty().await);
}

#[tokio::test]
async fn test_matching_cookie_and_field_from_another_session_is_rejected() {
    let attacker = TestApp::new();
    let attacker_token = attacker.csrf_token().await;

    let app = TestApp::new();
    app.authenticated().await;
    app.set_cookie(CSRF_COOKIE, &attacker_token);

    let mut fields = SNIPPET.to_vec();
    fields.push(("csrf_token", attacker_token.as_str()));
    let response = app.post_form("/snippet/views", &fields).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.snippets.is_empty().await);
}

#[tokio::test]
async fn test_signup_without_token_creates_no_user() {
    let app = TestApp::new();
    app.get("/").await;

    let response = app
        .post_form(
            "/user/signup",
            &[
                ("name", "Mallory"),
                ("email", "mallory@example.com"),
                ("password", TEST_PASSWORD),
            ],
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.users.is_empty().await);
}

#[tokio::test]
async fn test_rejected_post_from_fresh_visitor_creates_no_session() {
    let app = TestApp::new();
    let fields = [
        ("name", "Mallory"),
        ("email", "mallory@example.com"),
        ("password", TEST_PASSWORD),
    ];

    let response = app.post_form("/user/signup", &fields).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.headers.get("set-cookie").is_none());

    // A token minted for some other visitor, in both cookie and field.
    let other = TestApp::new();
    let token = other.csrf_token().await;
    app.set_cookie(CSRF_COOKIE, &token);
    let mut with_token = fields.to_vec();
    with_token.push(("csrf_token", token.as_str()));

    let response = app.post_form("/user/signup", &with_token).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.headers.get("set-cookie").is_none());

    assert!(app.sessions.is_empty().await);
    assert!(app.users.is_empty().await);
}

#[tokio::test]
async fn test_token_accepted_from_header() {
    let app = TestApp::new();
    app.authenticated().await;
    let token = app.csrf_token().await;

    let response = app
        .request(
            Method::POST,
            "/snippet/views",
            Some(&SNIPPET),
            &[(CSRF_HEADER, token.as_str())],
        )
        .await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(app.snippets.len().await, 1);
}

#[tokio::test]
async fn test_token_survives_login() {
    let app = TestApp::new();
    let before = app.csrf_token().await;
    app.authenticated().await;
    assert_eq!(app.cookie(CSRF_COOKIE).unwrap(), before);

    let response = app.get("/snippet/views").await;
    assert!(response.body.contains(&before));
}
