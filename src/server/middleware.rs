//! Cross-cutting request stages.
//!
//! Server-wide stages wrap every request, including static assets:
//!
//! ```text
//! panic recovery ─► access log ─► security headers ─► router
//! ```
//!
//! The access log is a `TraceLayer` fed by [`request_span`] and
//! [`log_response`]. The session stage is installed per route by the route
//! table.

use std::any::Any;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::header::{
    CONNECTION, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::{error, info, info_span, Span};

/// Headers added to every response.
pub const SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (
        CONTENT_SECURITY_POLICY,
        "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com",
    ),
    (REFERRER_POLICY, "origin-when-cross-origin"),
    (X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (X_FRAME_OPTIONS, "deny"),
    (X_XSS_PROTECTION, "0"),
];

// =============================================================================
// Server-wide stages
// =============================================================================

/// Response for a request whose handling panicked.
///
/// Installed through `CatchPanicLayer::custom`; the connection is closed
/// and the server keeps serving other requests.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };

    error!(
        panic = %message,
        backtrace = %std::backtrace::Backtrace::force_capture(),
        "Request handler panicked"
    );

    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    apply_security_headers(headers);
    response
}

/// Span wrapping one request, carrying the peer address and protocol.
pub fn request_span(request: &Request) -> Span {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    info_span!(
        "request",
        remote_addr = %remote_addr,
        protocol = ?request.version(),
        method = %request.method(),
        uri = %request.uri(),
    )
}

/// One log line per request, emitted once the response exists.
pub fn log_response(response: &Response, latency: Duration, _span: &Span) {
    info!(
        status = response.status().as_u16(),
        elapsed_ms = latency.as_secs_f64() * 1000.0,
        "Handled request"
    );
}

pub fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

pub async fn secure_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    apply_security_headers(response.headers_mut());
    response
}
