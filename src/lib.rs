//! # Snippetbox
//!
//! A small multi-page web application for sharing snippets of text, built
//! around a request pipeline of composable stages.
//!
//! ## Features
//!
//! - **Route table**: method and path patterns with named parameters and a
//!   trailing wildcard, validated for ambiguity at startup
//! - **Server-side sessions**: opaque cookie tokens, renewed on login and logout
//! - **CSRF protection**: per-session tokens checked before any state-changing
//!   handler runs
//! - **Authentication gate**: protected routes redirect anonymous visitors
//! - **Template cache**: pages parsed once at startup, rendered into a buffer
//!
//! ## Architecture
//!
//! - [`server`] - Route table, pipeline stages and handlers
//! - [`session`] - Session layer setup and stores
//! - [`templates`] - Template cache and renderer
//! - [`models`] - Snippet and user stores
//! - [`forms`] - Form types and validation
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use snippetbox::{
//!     create_router, AppState, CsrfGuard, MemorySessionStore, MemorySnippetStore,
//!     MemoryUserStore, Renderer, RouterConfig, TemplateCache, DEFAULT_SESSION_LIFETIME,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let renderer = Renderer::new(TemplateCache::from_dir("./ui/html")?);
//!     let sessions = snippetbox::session_layer(
//!         Arc::new(MemorySessionStore::new()),
//!         DEFAULT_SESSION_LIFETIME,
//!         true,
//!     );
//!     let state = AppState::new(
//!         Arc::new(MemorySnippetStore::new()),
//!         Arc::new(MemoryUserStore::new()),
//!         renderer,
//!         sessions,
//!         CsrfGuard::random(),
//!         "./ui/static",
//!     );
//!
//!     let router = create_router(state, RouterConfig::new())?;
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:4000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod forms;
pub mod models;
pub mod server;
pub mod session;
pub mod templates;

// Re-export commonly used types
pub use config::Config;
pub use error::{CsrfError, ModelError, RouteError, SessionError, TemplateError};
pub use forms::{LoginForm, SignupForm, SnippetCreateForm, Validator};
pub use models::{MemorySnippetStore, MemoryUserStore, Snippet, SnippetStore, User, UserStore};
pub use server::{
    app_routes, create_router, AppError, AppState, AuthState, CsrfGuard, RoutePolicy, RouteTable,
    RouterConfig,
};
pub use session::{
    session_layer, ExpiredDeletion, MemorySessionStore, Session, SessionLayer, SessionStore,
    DEFAULT_SESSION_LIFETIME,
};
pub use templates::{Renderer, TemplateCache, TemplateData};
