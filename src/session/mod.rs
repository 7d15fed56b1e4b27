//! Server-side sessions keyed by an opaque cookie token.
//!
//! # Lifecycle
//!
//! ```text
//! request ─► SessionManagerLayer ─► Session (extensions) ─► csrf ─► handler
//!                                                                      │
//! response ◄─ Set-Cookie ◄─ save if modified ◄──────────────────────────┘
//! ```
//!
//! Sessions are handled by `tower-sessions`. A visitor without a valid token
//! gets a fresh session that is only stored once something writes to it.
//! Login and logout call [`Session::cycle_id`], which moves the data to a new
//! token and deletes the old one.
//!
//! This module picks the cookie attributes and provides the stores the layer
//! runs on.

mod store;

use std::sync::Arc;

use async_trait::async_trait;
use time::Duration;
use tower_sessions::cookie::SameSite;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store;
use tower_sessions::Expiry;

pub use store::{MemorySessionStore, DEFAULT_SESSION_CAPACITY};
pub use tower_sessions::session::{Id as SessionId, Record as SessionRecord};
pub use tower_sessions::{ExpiredDeletion, Session, SessionManagerLayer, SessionStore};

/// Name of the session token cookie.
pub const SESSION_COOKIE: &str = "session";

/// Default session lifetime (12 hours).
pub const DEFAULT_SESSION_LIFETIME: Duration = Duration::hours(12);

/// The session layer installed on dynamic routes.
pub type SessionLayer = SessionManagerLayer<SharedSessionStore>;

/// Build the session layer over `store`.
///
/// The cookie is `HttpOnly`, `SameSite=Lax` and scoped to `/`; `secure` adds
/// the `Secure` attribute. Sessions expire after `lifetime` without activity.
pub fn session_layer(
    store: Arc<dyn SessionStore>,
    lifetime: Duration,
    secure: bool,
) -> SessionLayer {
    SessionManagerLayer::new(SharedSessionStore::new(store))
        .with_name(SESSION_COOKIE)
        .with_path("/")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(secure)
        .with_expiry(Expiry::OnInactivity(lifetime))
}

/// A session store behind a trait object, so the layer type does not depend
/// on which backend the binary or a test picked.
#[derive(Debug, Clone)]
pub struct SharedSessionStore(Arc<dyn SessionStore>);

impl SharedSessionStore {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self(store)
    }
}

#[async_trait]
impl SessionStore for SharedSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        self.0.create(record).await
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.0.save(record).await
    }

    async fn load(&self, id: &Id) -> session_store::Result<Option<Record>> {
        self.0.load(id).await
    }

    async fn delete(&self, id: &Id) -> session_store::Result<()> {
        self.0.delete(id).await
    }
}
