//! Server-wide pipeline tests.
//!
//! Tests verify:
//! - Security headers on dynamic, static and not-found responses
//! - Rendered 404 page for unmatched paths
//! - Method mismatches never reach a handler
//! - Panics become 500 responses and the server keeps serving
//! - Session backend failures become 500 responses
//! - Session writes made before a handler fails with a client error persist

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::Response;

use snippetbox::server::{AppError, PageContext, RoutePolicy, FLASH_KEY};
use snippetbox::session::{SessionId, SESSION_COOKIE};

use super::test_utils::{FailingSessionStore, TestApp};

async fn exploding_handler() -> &'static str {
    panic!("handler exploded")
}

async fn failing_handler(ctx: PageContext) -> Result<Response, AppError> {
    ctx.session
        .insert(FLASH_KEY, "Saved before the failure")
        .await?;
    Err(AppError::NotFound)
}

fn app_with_panic_route() -> TestApp {
    TestApp::with_routes(|table| {
        table
            .register(Method::GET, "/explode", RoutePolicy::Dynamic, exploding_handler)
            .unwrap();
    })
}

fn assert_security_headers(response: &super::test_utils::TestResponse) {
    assert_eq!(
        response.header("content-security-policy"),
        Some("default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com")
    );
    assert_eq!(response.header("referrer-policy"), Some("origin-when-cross-origin"));
    assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
    assert_eq!(response.header("x-frame-options"), Some("deny"));
    assert_eq!(response.header("x-xss-protection"), Some("0"));
}

// =============================================================================
// Security Headers and Static Files
// =============================================================================

#[tokio::test]
async fn test_home_page_has_security_headers() {
    let app = TestApp::new();
    let response = app.get("/").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Latest Snippets"));
    assert_security_headers(&response);
}

#[tokio::test]
async fn test_static_file_bypasses_session_stages() {
    let app = TestApp::new();
    let response = app.get("/static/css/main.css").await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.header("content-type").unwrap().starts_with("text/css"));
    assert!(response.headers.get("set-cookie").is_none());
    assert_security_headers(&response);
    assert!(app.sessions.is_empty().await);
}

#[tokio::test]
async fn test_missing_static_file() {
    let app = TestApp::new();
    let response = app.get("/static/css/missing.css").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Route Misses
// =============================================================================

#[tokio::test]
async fn test_unknown_path_renders_not_found_page() {
    let app = TestApp::new();
    let response = app.get("/no/such/page").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body.contains("<h2>Not Found</h2>"));
    assert!(response.header("content-type").unwrap().starts_with("text/html"));
    assert_security_headers(&response);
}

#[tokio::test]
async fn test_method_mismatch_never_reaches_handler() {
    let app = TestApp::new();

    for (method, uri) in [
        (Method::DELETE, "/snippet/views"),
        (Method::GET, "/user/logout"),
        (Method::POST, "/"),
        (Method::PUT, "/user/login"),
    ] {
        let response = app.request(method.clone(), uri, None, &[]).await;
        assert!(
            response.status == StatusCode::METHOD_NOT_ALLOWED
                || response.status == StatusCode::NOT_FOUND,
            "{method} {uri} returned {}",
            response.status
        );
        assert!(response.headers.get("set-cookie").is_none());
    }
    assert!(app.sessions.is_empty().await);
}

// =============================================================================
// Session Backend
// =============================================================================

#[tokio::test]
async fn test_session_save_failure_is_500() {
    let app = TestApp::with_session_store(Arc::new(FailingSessionStore));

    // A fresh visitor's session is written on the way out, which fails.
    let response = app.get("/").await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers.get("set-cookie").is_none());
    assert!(!response.body.contains("session backend unavailable"));
}

#[tokio::test]
async fn test_session_load_failure_is_500() {
    let app = TestApp::with_session_store(Arc::new(FailingSessionStore));
    app.set_cookie(SESSION_COOKIE, &SessionId::default().to_string());

    let response = app.get("/user/login").await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body, "Internal Server Error");
    assert_security_headers(&response);
}

#[tokio::test]
async fn test_session_failure_leaves_static_files_alone() {
    let app = TestApp::with_session_store(Arc::new(FailingSessionStore));
    let response = app.get("/static/css/main.css").await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_flash_written_before_handler_error_survives() {
    let app = TestApp::with_routes(|table| {
        table
            .register(Method::GET, "/fail", RoutePolicy::Dynamic, failing_handler)
            .unwrap();
    });

    let response = app.get("/fail").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(app.session_token().is_some());

    let response = app.get("/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Saved before the failure"));

    let response = app.get("/").await;
    assert!(!response.body.contains("Saved before the failure"));
}

// =============================================================================
// Panic Recovery
// =============================================================================

#[tokio::test]
async fn test_panic_becomes_500_and_closes_connection() {
    let app = app_with_panic_route();

    let response = app.get("/explode").await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.header("connection"), Some("close"));
    assert!(!response.body.contains("handler exploded"));
    assert_security_headers(&response);

    let response = app.get("/").await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_server_survives_panic_over_real_socket() {
    let app = app_with_panic_route();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = app
        .router
        .clone()
        .into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, service).await.unwrap();
    });

    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/explode"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);

    for _ in 0..3 {
        let response = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert!(response.text().await.unwrap().contains("Latest Snippets"));
    }
}
