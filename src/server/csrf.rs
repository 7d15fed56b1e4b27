//! Anti-forgery tokens for state-changing requests.
//!
//! Each session carries a random seed; the token is the HMAC-SHA256 of that
//! seed under a process-wide secret, so it stays stable for the session's
//! lifetime (and across token renewal, which keeps session data). Only safe
//! requests seed a session; an unsafe request from a session with no seed is
//! rejected without storing anything.
//!
//! # Flow
//!
//! ```text
//! GET  ─► token into request extensions ─► rendered as hidden field
//!      └► csrf_token cookie set on the response
//!
//! POST ─► cookie == submitted field == session token ?  ─► handler
//!                                         │ no
//!                                         └─► 400, handler never runs
//! ```
//!
//! The submitted token is read from the `csrf_token` form field or, failing
//! that, the `X-CSRF-Token` header.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tower_sessions::cookie::{Cookie, SameSite};
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::error::{CsrfError, SessionError};
use crate::session::Session;

use super::handlers::AppError;

/// HMAC-SHA256 type alias
type HmacSha256 = Hmac<Sha256>;

/// Name of the CSRF cookie.
pub const CSRF_COOKIE: &str = "csrf_token";

/// Name of the hidden form field carrying the token.
pub const CSRF_FIELD: &str = "csrf_token";

/// Header accepted in place of the form field.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Session key holding the per-session seed.
pub const CSRF_SEED_KEY: &str = "csrf_seed";

/// Largest request body buffered for token inspection.
pub const MAX_FORM_BYTES: usize = 64 * 1024;

// =============================================================================
// Types
// =============================================================================

/// The current session's token, placed in the request extensions for handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl IntoResponse for CsrfError {
    fn into_response(self) -> Response {
        let status = StatusCode::BAD_REQUEST;
        match &self {
            CsrfError::UnreadableBody => {
                debug!(status = status.as_u16(), "CSRF check failed: {}", self)
            }
            _ => warn!(status = status.as_u16(), "CSRF check failed: {}", self),
        }
        (status, "Bad Request").into_response()
    }
}

// =============================================================================
// Guard
// =============================================================================

/// Issues and verifies CSRF tokens.
#[derive(Clone)]
pub struct CsrfGuard {
    key: Arc<[u8]>,
    secure: bool,
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl CsrfGuard {
    /// Guard keyed by `secret`, issuing `Secure` cookies.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: Arc::from(secret.as_ref()),
            secure: true,
        }
    }

    /// Guard keyed by 32 random bytes; tokens do not survive a restart.
    pub fn random() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(secret)
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Token derived from a session seed.
    pub fn token_for_seed(&self, seed: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(seed.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Token for `session`, seeding the session on first use.
    pub async fn issue_token(&self, session: &Session) -> Result<String, SessionError> {
        if let Some(token) = self.existing_token(session).await? {
            return Ok(token);
        }
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let seed = hex::encode(seed);
        session.insert(CSRF_SEED_KEY, &seed).await?;
        Ok(self.token_for_seed(&seed))
    }

    /// Token for `session` if it has been seeded. Never writes to the session.
    pub async fn existing_token(
        &self,
        session: &Session,
    ) -> Result<Option<String>, SessionError> {
        let seed = session.get::<String>(CSRF_SEED_KEY).await?;
        Ok(seed.map(|seed| self.token_for_seed(&seed)))
    }

    /// Check the cookie and the submitted token against the session's token.
    ///
    /// A session without a token matches nothing. Both comparisons always run
    /// and neither short-circuits on content.
    pub fn verify(
        &self,
        expected: Option<&str>,
        cookie: Option<&str>,
        submitted: Option<&str>,
    ) -> Result<(), CsrfError> {
        let cookie = cookie.ok_or(CsrfError::MissingCookie)?;
        let submitted = submitted.ok_or(CsrfError::MissingToken)?;
        let expected = expected.ok_or(CsrfError::Mismatch)?;

        let cookie_ok = cookie.as_bytes().ct_eq(expected.as_bytes());
        let submitted_ok = submitted.as_bytes().ct_eq(expected.as_bytes());

        if bool::from(cookie_ok & submitted_ok) {
            Ok(())
        } else {
            Err(CsrfError::Mismatch)
        }
    }

    fn set_cookie(&self, headers: &mut HeaderMap, token: &str) {
        let cookie = Cookie::build((CSRF_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build();
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => warn!("Unencodable CSRF cookie: {}", e),
        }
    }
}

/// Value of the CSRF cookie, if the request carries one.
fn request_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == CSRF_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

/// GET, HEAD, OPTIONS and TRACE never change state.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn form_field(body: &Bytes, name: &str) -> Option<String> {
    form_urlencoded::parse(body)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

// =============================================================================
// Middleware
// =============================================================================

/// CSRF stage. Must run inside the session stage.
///
/// Safe methods get the token in their extensions and the cookie refreshed.
/// Other methods are rejected before the handler unless the cookie and the
/// submitted token both match the session's token.
pub async fn csrf_middleware(
    State(guard): State<CsrfGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = request
        .extensions()
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::Internal("CSRF stage runs without a session".to_string()))?;
    let cookie = request_cookie(request.headers());

    if is_safe_method(request.method()) {
        let expected = guard.issue_token(&session).await?;
        request
            .extensions_mut()
            .insert(CsrfToken(expected.clone()));
        let mut response = next.run(request).await;
        if cookie.as_deref() != Some(expected.as_str()) {
            guard.set_cookie(response.headers_mut(), &expected);
        }
        return Ok(response);
    }

    let expected = guard.existing_token(&session).await?;

    let header_token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|_| CsrfError::UnreadableBody)?;

    let submitted = form_field(&bytes, CSRF_FIELD).or(header_token);
    guard.verify(expected.as_deref(), cookie.as_deref(), submitted.as_deref())?;

    let mut request = Request::from_parts(parts, Body::from(bytes));
    if let Some(expected) = expected {
        request.extensions_mut().insert(CsrfToken(expected));
    }
    Ok(next.run(request).await)
}
