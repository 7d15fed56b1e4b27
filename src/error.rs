use http::Method;
use thiserror::Error;

/// Errors returned by the snippet and user stores.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// No row matches the lookup (or the row has expired)
    #[error("no matching record found")]
    NoRecord,

    /// A user with this email address already exists
    #[error("duplicate email address")]
    DuplicateEmail,

    /// Email/password pair does not match a known user
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Backend failure
    #[error("store error: {0}")]
    Store(String),
}

/// Errors from loading, mutating or persisting session state.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session backend failed, or a value did not (de)serialize
    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// Errors from building the template cache or executing a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A template directory or file could not be read
    #[error("failed to read templates from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A template failed to parse
    #[error("failed to parse template '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    /// The shared base layout is missing
    #[error("base layout '{0}' is missing")]
    MissingLayout(String),

    /// No page with this key was cached at startup
    #[error("the template {0} does not exist")]
    NotFound(String),

    /// Template execution failed
    #[error("failed to render template '{name}': {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

/// Errors raised while building the route table.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// Pattern syntax is invalid
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Pattern has the same shape as an already registered one
    #[error("route {method} {pattern} is ambiguous with already registered {existing}")]
    Ambiguous {
        method: Method,
        pattern: String,
        existing: String,
    },

    /// The method cannot be routed
    #[error("unsupported route method: {0}")]
    UnsupportedMethod(Method),
}

/// Reasons a state-changing request fails anti-forgery verification.
#[derive(Debug, Clone, Error)]
pub enum CsrfError {
    /// The request carries no CSRF cookie
    #[error("missing CSRF cookie")]
    MissingCookie,

    /// Neither the form field nor the header carries a token
    #[error("missing CSRF token")]
    MissingToken,

    /// Submitted token, cookie and session token disagree
    #[error("CSRF token mismatch")]
    Mismatch,

    /// The request body could not be buffered for inspection
    #[error("request body could not be read")]
    UnreadableBody,
}
