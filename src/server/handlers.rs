//! HTTP request handlers for the snippetbox pages.
//!
//! # Endpoints
//!
//! - `GET /` - Latest snippets
//! - `GET /snippet/views/{id}` - One snippet
//! - `GET|POST /snippet/views` - Create form and submission
//! - `GET|POST /user/signup`, `GET|POST /user/login`, `POST /user/logout`
//! - `GET /static/{*path}` - Static assets

use std::backtrace::Backtrace;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        rejection::{FormRejection, PathRejection},
        FromRequestParts, Path, Request, State,
    },
    http::{request::Parts, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use thiserror::Error;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, error, warn};

use crate::error::{CsrfError, ModelError, SessionError, TemplateError};
use crate::forms::{
    FormView, LoginForm, SignupForm, SnippetCreateForm, Validator, DEFAULT_EXPIRY_DAYS,
};
use crate::models::{SnippetStore, UserStore};
use crate::session::{Session, SessionLayer};
use crate::templates::{Renderer, TemplateData};

use super::auth;
use super::csrf::{CsrfGuard, CsrfToken};

/// Session key holding the one-shot flash message.
pub const FLASH_KEY: &str = "flash";

/// URL prefix under which static assets are served.
pub const STATIC_PREFIX: &str = "/static";

// =============================================================================
// Application State
// =============================================================================

/// Everything the handlers and per-route middleware need, built once by the
/// composition root and cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub snippets: Arc<dyn SnippetStore>,
    pub users: Arc<dyn UserStore>,
    pub renderer: Renderer,
    pub sessions: SessionLayer,
    pub csrf: CsrfGuard,
    pub static_files: ServeDir,
}

impl AppState {
    pub fn new(
        snippets: Arc<dyn SnippetStore>,
        users: Arc<dyn UserStore>,
        renderer: Renderer,
        sessions: SessionLayer,
        csrf: CsrfGuard,
        static_dir: impl AsRef<FsPath>,
    ) -> Self {
        Self {
            snippets,
            users,
            renderer,
            sessions,
            csrf,
            static_files: ServeDir::new(static_dir.as_ref()),
        }
    }

    fn render(
        &self,
        status: StatusCode,
        page: &str,
        data: &TemplateData,
    ) -> Result<Response, AppError> {
        Ok(self.renderer.render(status, page, data)?)
    }
}

// =============================================================================
// Error Handling
// =============================================================================

/// Failure of a handler or per-route stage, mapped to a client-visible status.
///
/// Bodies are generic; details of server errors only reach the log.
#[derive(Debug, Error)]
pub enum AppError {
    /// The addressed resource does not exist
    #[error("not found")]
    NotFound,

    /// The request itself is unacceptable
    #[error("client error: {0}")]
    Client(StatusCode),

    #[error(transparent)]
    Csrf(#[from] CsrfError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Pipeline misconfiguration or other internal fault
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::Model(ModelError::NoRecord) => StatusCode::NOT_FOUND,
            AppError::Client(status) => *status,
            AppError::Csrf(_) => StatusCode::BAD_REQUEST,
            AppError::Model(_)
            | AppError::Session(_)
            | AppError::Template(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        AppError::Session(err.into())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        debug!(error = %rejection, "Rejected form submission");
        AppError::Client(rejection.status())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Csrf(err) = self {
            return err.into_response();
        }

        let status = self.status();
        if status.is_server_error() {
            error!(
                status = status.as_u16(),
                backtrace = %Backtrace::force_capture(),
                "Server error: {}",
                self
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(status = status.as_u16(), "Not found: {}", self);
        } else {
            warn!(status = status.as_u16(), "Client error: {}", self);
        }

        let body = status.canonical_reason().unwrap_or("Error");
        (status, body).into_response()
    }
}

// =============================================================================
// Extractors
// =============================================================================

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CsrfToken>()
            .cloned()
            .ok_or_else(|| AppError::Internal("no CSRF stage on this route".to_string()))
    }
}

fn request_session(parts: &Parts) -> Result<Session, AppError> {
    parts
        .extensions
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::Internal("no session stage on this route".to_string()))
}

/// The per-request pieces every dynamic page renders with.
pub struct PageContext {
    pub session: Session,
    pub csrf_token: CsrfToken,
}

impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self {
            session: request_session(parts)?,
            csrf_token: CsrfToken::from_request_parts(parts, state).await?,
        })
    }
}

impl PageContext {
    /// Fresh render context. Pops the flash message, so it shows exactly once.
    pub async fn template_data(&self) -> Result<TemplateData, AppError> {
        let mut data = TemplateData::new();
        data.flash = self.session.remove::<String>(FLASH_KEY).await?;
        data.is_authenticated = auth::is_authenticated(&self.session).await?;
        data.csrf_token = self.csrf_token.0.clone();
        Ok(data)
    }
}

// =============================================================================
// Snippet Handlers
// =============================================================================

/// `GET /`
pub async fn home(State(state): State<AppState>, ctx: PageContext) -> Result<Response, AppError> {
    let snippets = state.snippets.latest().await?;
    let data = ctx.template_data().await?.with_snippets(snippets);
    state.render(StatusCode::OK, "home.html", &data)
}

/// `GET /snippet/views/{id}`
///
/// Anything but a positive integer id is a 404 without touching the store,
/// including segments that do not percent-decode to UTF-8.
pub async fn snippet_view(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
    ctx: PageContext,
) -> Result<Response, AppError> {
    let id = match id {
        Ok(Path(id)) => parse_snippet_id(&id).ok_or(AppError::NotFound)?,
        Err(rejection) => {
            debug!(error = %rejection, "Undecodable snippet id");
            return Err(AppError::NotFound);
        }
    };
    let snippet = state.snippets.get(id).await?;
    let data = ctx.template_data().await?.with_snippet(snippet);
    state.render(StatusCode::OK, "view.html", &data)
}

fn parse_snippet_id(raw: &str) -> Option<i64> {
    raw.parse::<i64>().ok().filter(|id| *id >= 1)
}

/// `GET /snippet/views`
pub async fn snippet_create_form(
    State(state): State<AppState>,
    ctx: PageContext,
) -> Result<Response, AppError> {
    let form = SnippetCreateForm::blank();
    let validator = Validator::new();
    let data = ctx
        .template_data()
        .await?
        .with_form(&FormView::new(&form, &validator));
    state.render(StatusCode::OK, "create.html", &data)
}

/// `POST /snippet/views`
pub async fn snippet_create(
    State(state): State<AppState>,
    ctx: PageContext,
    form: Result<Form<SnippetCreateForm>, FormRejection>,
) -> Result<Response, AppError> {
    let Form(form) = form?;

    let validator = form.validate();
    if !validator.valid() {
        let data = ctx
            .template_data()
            .await?
            .with_form(&FormView::new(&form, &validator));
        return state.render(StatusCode::UNPROCESSABLE_ENTITY, "create.html", &data);
    }

    let days = form.expires_days().unwrap_or(DEFAULT_EXPIRY_DAYS);
    let id = state.snippets.insert(&form.title, &form.content, days).await?;

    ctx.session
        .insert(FLASH_KEY, "Snippet successfully created!")
        .await?;
    Ok(Redirect::to(&format!("/snippet/views/{id}")).into_response())
}

// =============================================================================
// User Handlers
// =============================================================================

/// `GET /user/signup`
pub async fn user_signup_form(
    State(state): State<AppState>,
    ctx: PageContext,
) -> Result<Response, AppError> {
    let form = SignupForm::default();
    let validator = Validator::new();
    let data = ctx
        .template_data()
        .await?
        .with_form(&FormView::new(&form, &validator));
    state.render(StatusCode::OK, "signup.html", &data)
}

/// `POST /user/signup`
pub async fn user_signup(
    State(state): State<AppState>,
    ctx: PageContext,
    form: Result<Form<SignupForm>, FormRejection>,
) -> Result<Response, AppError> {
    let Form(form) = form?;

    let mut validator = form.validate();
    if validator.valid() {
        match state
            .users
            .insert(&form.name, &form.email, &form.password)
            .await
        {
            Ok(_) => {
                ctx.session
                    .insert(FLASH_KEY, "Your signup was successful. Please log in.")
                    .await?;
                return Ok(Redirect::to(auth::LOGIN_PATH).into_response());
            }
            Err(ModelError::DuplicateEmail) => {
                validator.add_field_error("email", "Email address is already in use");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let data = ctx
        .template_data()
        .await?
        .with_form(&FormView::new(&form, &validator));
    state.render(StatusCode::UNPROCESSABLE_ENTITY, "signup.html", &data)
}

/// `GET /user/login`
pub async fn user_login_form(
    State(state): State<AppState>,
    ctx: PageContext,
) -> Result<Response, AppError> {
    let form = LoginForm::default();
    let validator = Validator::new();
    let data = ctx
        .template_data()
        .await?
        .with_form(&FormView::new(&form, &validator));
    state.render(StatusCode::OK, "login.html", &data)
}

/// `POST /user/login`
pub async fn user_login(
    State(state): State<AppState>,
    ctx: PageContext,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, AppError> {
    let Form(form) = form?;

    let mut validator = form.validate();
    if validator.valid() {
        match state.users.authenticate(&form.email, &form.password).await {
            Ok(user_id) => {
                auth::login(&ctx.session, user_id).await?;
                return Ok(Redirect::to("/snippet/views").into_response());
            }
            Err(ModelError::InvalidCredentials) => {
                validator.add_non_field_error("Email or password is incorrect");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let data = ctx
        .template_data()
        .await?
        .with_form(&FormView::new(&form, &validator));
    state.render(StatusCode::UNPROCESSABLE_ENTITY, "login.html", &data)
}

/// `POST /user/logout`
pub async fn user_logout(ctx: PageContext) -> Result<Response, AppError> {
    auth::logout(&ctx.session).await?;
    Ok(Redirect::to("/").into_response())
}

// =============================================================================
// Static Files and Fallback
// =============================================================================

/// `GET /static/{*path}`: hand the request to [`ServeDir`] with the prefix stripped.
pub async fn serve_static(State(state): State<AppState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();

    let stripped = parts
        .uri
        .path()
        .strip_prefix(STATIC_PREFIX)
        .unwrap_or("/")
        .to_string();
    let path_and_query = match parts.uri.query() {
        Some(query) => format!("{stripped}?{query}"),
        None => stripped,
    };
    parts.uri = match path_and_query.parse::<Uri>() {
        Ok(uri) => uri,
        Err(_) => return AppError::NotFound.into_response(),
    };

    match state
        .static_files
        .oneshot(Request::from_parts(parts, body))
        .await
    {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// Rendered 404 page for requests no route matched.
pub async fn not_found_page(state: &AppState) -> Response {
    let data = TemplateData::new();
    match state.render(StatusCode::NOT_FOUND, "not_found.html", &data) {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}
