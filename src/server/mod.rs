//! HTTP server layer for snippetbox.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   panic recovery ─► access log ─► security headers ─► router    │
//! │                                                                 │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌────────────┐ │
//! │  │   routes   │  │ middleware │  │    csrf    │  │    auth    │ │
//! │  │  (table +  │  │  (server   │  │  (tokens)  │  │   (gate)   │ │
//! │  │ composition│  │  stages)   │  │            │  │            │ │
//! │  │     )      │  │            │  │            │  │            │ │
//! │  └────────────┘  └────────────┘  └────────────┘  └────────────┘ │
//! │                         handlers                                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod csrf;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use auth::{
    is_authenticated, login, logout, redirect_if_authenticated, require_authentication,
    AuthState, AUTHENTICATED_USER_ID, LOGIN_PATH,
};
pub use csrf::{csrf_middleware, CsrfGuard, CsrfToken, CSRF_COOKIE, CSRF_FIELD, CSRF_HEADER};
pub use handlers::{AppError, AppState, PageContext, FLASH_KEY};
pub use middleware::{
    apply_security_headers, handle_panic, log_response, request_span, secure_headers,
    SECURITY_HEADERS,
};
pub use routes::{
    app_routes, compose, create_router, Dispatch, PathPattern, ResolvedRoute, RouteEntry,
    RoutePolicy, RouteStage, RouteTable, RouterConfig, ServerStage,
};
