//! Session-backed authentication gate.
//!
//! A visitor is either [`AuthState::Anonymous`] or
//! [`AuthState::Authenticated`], decided solely by the presence of the user id
//! under [`AUTHENTICATED_USER_ID`] in their session.
//!
//! ```text
//!              login (renew token, then store id)
//!  Anonymous ──────────────────────────────────────► Authenticated
//!      ▲                                                   │
//!      └───────────────────────────────────────────────────┘
//!        logout (renew token, drop id, flash message)
//! ```
//!
//! Both transitions renew the session token so a token captured on one side
//! is useless on the other.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use http::header::CACHE_CONTROL;
use http::HeaderValue;
use tracing::debug;

use crate::error::{ModelError, SessionError};
use crate::models::UserStore;
use crate::session::Session;

use super::handlers::{AppError, FLASH_KEY};

/// Session key holding the authenticated user's id.
pub const AUTHENTICATED_USER_ID: &str = "authenticatedUserID";

/// Where anonymous visitors to protected pages are sent.
pub const LOGIN_PATH: &str = "/user/login";

/// Flash message shown after logging out.
pub const LOGOUT_FLASH: &str = "You've been logged out successfully!";

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated(i64),
}

impl AuthState {
    /// Read the state from `session` without modifying it.
    pub async fn of(session: &Session) -> Result<Self, SessionError> {
        Ok(match session.get::<i64>(AUTHENTICATED_USER_ID).await? {
            Some(id) => AuthState::Authenticated(id),
            None => AuthState::Anonymous,
        })
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            AuthState::Anonymous => None,
            AuthState::Authenticated(id) => Some(*id),
        }
    }
}

/// Whether `session` carries an authenticated user. Pure read.
pub async fn is_authenticated(session: &Session) -> Result<bool, SessionError> {
    Ok(session.get_value(AUTHENTICATED_USER_ID).await?.is_some())
}

/// Anonymous to authenticated: renew the token, then record the user.
pub async fn login(session: &Session, user_id: i64) -> Result<(), SessionError> {
    session.cycle_id().await?;
    session.insert(AUTHENTICATED_USER_ID, user_id).await?;
    Ok(())
}

/// Authenticated to anonymous: renew the token, forget the user, leave a flash.
pub async fn logout(session: &Session) -> Result<(), SessionError> {
    session.cycle_id().await?;
    session.remove::<i64>(AUTHENTICATED_USER_ID).await?;
    session.insert(FLASH_KEY, LOGOUT_FLASH).await?;
    Ok(())
}

// =============================================================================
// Middleware
// =============================================================================

fn request_session(request: &Request) -> Result<Session, AppError> {
    request
        .extensions()
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::Internal("auth stage runs without a session".to_string()))
}

/// Protected-route stage.
///
/// Anonymous visitors, and sessions whose user no longer exists, are
/// redirected to the login page before the handler runs. Responses that do
/// reach the handler are marked `Cache-Control: no-store`.
pub async fn require_authentication(
    State(users): State<Arc<dyn UserStore>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = request_session(&request)?;

    let user_id = match AuthState::of(&session).await? {
        AuthState::Authenticated(id) => id,
        AuthState::Anonymous => {
            debug!(uri = %request.uri(), "Anonymous request to protected route");
            return Ok(Redirect::to(LOGIN_PATH).into_response());
        }
    };

    match users.get(user_id).await {
        Ok(user) => debug!(user_id, name = %user.name, "Authenticated request"),
        Err(ModelError::NoRecord) => {
            debug!(user_id, "Session refers to an unknown user");
            return Ok(Redirect::to(LOGIN_PATH).into_response());
        }
        Err(err) => return Err(err.into()),
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

/// Guest-route stage: authenticated visitors are sent home instead of seeing
/// the signup and login pages.
pub async fn redirect_if_authenticated(
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = request_session(&request)?;
    if is_authenticated(&session).await? {
        return Ok(Redirect::to("/").into_response());
    }
    Ok(next.run(request).await)
}
