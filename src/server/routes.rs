//! Route table and pipeline composition for snippetbox.
//!
//! Routes are registered into a [`RouteTable`] with a [`RoutePolicy`] naming
//! the per-route stages they run behind. Registration validates patterns and
//! rejects ambiguous ones, so a bad table fails at startup rather than at
//! request time. The table is then turned into an axum [`Router`] in a single
//! composition step.
//!
//! # Route Structure
//!
//! ```text
//! GET       /static/*path         - Static assets          (Static)
//! GET       /                     - Latest snippets        (Dynamic)
//! GET       /snippet/views/:id    - View one snippet       (Dynamic)
//! GET|POST  /user/signup          - Signup                 (Guest)
//! GET|POST  /user/login           - Login                  (Guest)
//! POST      /user/logout          - Logout                 (Protected)
//! GET|POST  /snippet/views        - Create a snippet       (Protected)
//! ```
//!
//! # Stage Order
//!
//! ```text
//! panic recovery ─► access log ─► security headers ─► router
//!     ─► session ─► csrf ─► (guest redirect | require auth) ─► handler
//! ```
//!
//! # Example
//!
//! ```ignore
//! use snippetbox::server::{create_router, AppState, RouterConfig};
//!
//! let state = AppState::new(snippets, users, renderer, sessions, csrf, "./ui/static");
//! let router = create_router(state, RouterConfig::new())?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:4000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    handler::Handler,
    middleware,
    response::{IntoResponse, Response},
    routing::{on, MethodFilter, MethodRouter},
    Router,
};
use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::RouteError;

use super::auth::{redirect_if_authenticated, require_authentication};
use super::csrf::csrf_middleware;
use super::handlers::{
    home, not_found_page, serve_static, snippet_create, snippet_create_form, snippet_view,
    user_login, user_login_form, user_logout, user_signup, user_signup_form, AppState,
};
use super::middleware::{handle_panic, log_response, request_span, secure_headers};

// =============================================================================
// Router Configuration
// =============================================================================

/// Router-level switches.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Whether the access-log stage is installed
    pub access_log: bool,
}

impl RouterConfig {
    /// Default configuration: access log enabled.
    pub fn new() -> Self {
        Self { access_log: true }
    }

    /// Enable or disable the access log.
    pub fn with_access_log(mut self, enabled: bool) -> Self {
        self.access_log = enabled;
        self
    }

    /// Server-wide stages in effect, outermost first.
    pub fn server_stages(&self) -> Vec<ServerStage> {
        let mut stages = vec![ServerStage::PanicRecovery];
        if self.access_log {
            stages.push(ServerStage::AccessLog);
        }
        stages.push(ServerStage::SecurityHeaders);
        stages
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Stages and Policies
// =============================================================================

/// Stage wrapped around the whole router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStage {
    PanicRecovery,
    AccessLog,
    SecurityHeaders,
}

/// Stage wrapped around a single route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStage {
    Session,
    Csrf,
    RedirectAuthenticated,
    RequireAuthentication,
}

/// Which per-route stages a route runs behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
    /// No per-route stages
    Static,
    /// Session and CSRF
    Dynamic,
    /// Session, CSRF, and authenticated visitors redirected home
    Guest,
    /// Session, CSRF, and anonymous visitors redirected to login
    Protected,
}

impl RoutePolicy {
    /// Per-route stages, outermost first.
    pub fn stages(&self) -> &'static [RouteStage] {
        match self {
            RoutePolicy::Static => &[],
            RoutePolicy::Dynamic => &[RouteStage::Session, RouteStage::Csrf],
            RoutePolicy::Guest => &[
                RouteStage::Session,
                RouteStage::Csrf,
                RouteStage::RedirectAuthenticated,
            ],
            RoutePolicy::Protected => &[
                RouteStage::Session,
                RouteStage::Csrf,
                RouteStage::RequireAuthentication,
            ],
        }
    }
}

// =============================================================================
// Path Patterns
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard(String),
}

/// A parsed route pattern: `/literal`, `/:name` parameters and an optional
/// trailing `/*name` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;

        let mut segments = Vec::new();
        if !rest.is_empty() {
            let parts: Vec<&str> = rest.split('/').collect();
            let last = parts.len() - 1;
            for (index, part) in parts.into_iter().enumerate() {
                if part.is_empty() {
                    return Err(invalid("empty segment"));
                }
                if part.contains(['{', '}']) {
                    return Err(invalid("braces are not allowed"));
                }
                let segment = if let Some(name) = part.strip_prefix(':') {
                    Segment::Param(valid_name(name).ok_or_else(|| invalid("bad parameter name"))?)
                } else if let Some(name) = part.strip_prefix('*') {
                    if index != last {
                        return Err(invalid("wildcard must be the last segment"));
                    }
                    Segment::Wildcard(valid_name(name).ok_or_else(|| invalid("bad wildcard name"))?)
                } else {
                    Segment::Literal(part.to_string())
                };
                segments.push(segment);
            }
        }

        let mut names: Vec<&str> = segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) | Segment::Wildcard(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect();
        let count = names.len();
        names.sort_unstable();
        names.dedup();
        if names.len() != count {
            return Err(invalid("duplicate parameter name"));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Pattern with parameter names erased; equal shapes are ambiguous.
    fn shape(&self) -> String {
        let mut shape = String::new();
        for segment in &self.segments {
            shape.push('/');
            match segment {
                Segment::Literal(text) => shape.push_str(text),
                Segment::Param(_) => shape.push(':'),
                Segment::Wildcard(_) => shape.push('*'),
            }
        }
        if shape.is_empty() {
            shape.push('/');
        }
        shape
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Literal(_)))
            .count()
    }

    /// The same pattern in axum's `{name}` / `{*name}` syntax.
    pub fn to_axum_path(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => format!("/{text}"),
                Segment::Param(name) => format!("/{{{name}}}"),
                Segment::Wildcard(name) => format!("/{{*{name}}}"),
            })
            .collect()
    }

    /// Match `path`, returning the percent-decoded parameters.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        let mut params = BTreeMap::new();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => {
                    if parts.get(index) != Some(&text.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let part = parts.get(index).filter(|part| !part.is_empty())?;
                    params.insert(name.clone(), decode(part));
                }
                Segment::Wildcard(name) => {
                    let remainder = parts.get(index..)?.join("/");
                    if remainder.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), decode(&remainder));
                    return Some(params);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }
}

fn valid_name(name: &str) -> Option<String> {
    let ok = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    ok.then(|| name.to_string())
}

fn decode(part: &str) -> String {
    urlencoding::decode(part)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| part.to_string())
}

// =============================================================================
// Route Table
// =============================================================================

/// One registered route. Immutable once in the table.
#[derive(Clone)]
pub struct RouteEntry {
    pub method: Method,
    pub pattern: PathPattern,
    pub policy: RoutePolicy,
    handler: MethodRouter<AppState>,
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("policy", &self.policy)
            .finish()
    }
}

/// A route lookup that found a handler.
#[derive(Debug)]
pub struct ResolvedRoute<'a> {
    pub entry: &'a RouteEntry,
    pub params: BTreeMap<String, String>,
}

/// Outcome of [`RouteTable::dispatch`].
#[derive(Debug)]
pub enum Dispatch<'a> {
    Found(ResolvedRoute<'a>),
    /// The path matched, but only for these methods
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// The dispatch table, built once at startup.
#[derive(Clone, Default, Debug)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Register `handler` for `method` requests matching `pattern`.
    ///
    /// Fails if the pattern is malformed, if the same method already has a
    /// pattern of the same shape, or if another method registered that shape
    /// under different parameter names.
    pub fn register<H, T>(
        &mut self,
        method: Method,
        pattern: &str,
        policy: RoutePolicy,
        handler: H,
    ) -> Result<(), RouteError>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| RouteError::UnsupportedMethod(method.clone()))?;
        let pattern = PathPattern::parse(pattern)?;
        let shape = pattern.shape();

        for existing in &self.entries {
            if existing.pattern.shape() != shape {
                continue;
            }
            if existing.method == method || existing.pattern != pattern {
                return Err(RouteError::Ambiguous {
                    method,
                    pattern: pattern.raw,
                    existing: format!("{} {}", existing.method, existing.pattern.as_str()),
                });
            }
        }

        self.entries.push(RouteEntry {
            method,
            pattern,
            policy,
            handler: on(filter, handler),
        });
        Ok(())
    }

    /// Resolve `(method, path)`. The match with the most literal segments wins.
    pub fn dispatch(&self, method: &Method, path: &str) -> Dispatch<'_> {
        let mut allowed = Vec::new();
        let mut best: Option<ResolvedRoute<'_>> = None;

        for entry in &self.entries {
            let Some(params) = entry.pattern.matches(path) else {
                continue;
            };
            if entry.method != *method {
                allowed.push(entry.method.clone());
                continue;
            }
            let better = best.as_ref().map_or(true, |current| {
                entry.pattern.literal_count() > current.entry.pattern.literal_count()
            });
            if better {
                best = Some(ResolvedRoute { entry, params });
            }
        }

        match best {
            Some(resolved) => Dispatch::Found(resolved),
            None if !allowed.is_empty() => Dispatch::MethodNotAllowed(allowed),
            None => Dispatch::NotFound,
        }
    }

    /// Compose the table and the server-wide stages into a router.
    pub fn into_router(self, state: AppState, config: &RouterConfig) -> Router {
        let index = Arc::new(self.clone());

        let mut by_path: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();
        for entry in self.entries {
            let handler = entry
                .policy
                .stages()
                .iter()
                .rev()
                .fold(entry.handler, |handler, stage| {
                    apply_route_stage(handler, *stage, &state)
                });
            let path = entry.pattern.to_axum_path();
            let merged = match by_path.remove(&path) {
                Some(existing) => existing.merge(handler),
                None => handler,
            };
            by_path.insert(path, merged);
        }

        let mut router = Router::new();
        for (path, handler) in by_path {
            router = router.route(&path, handler);
        }

        let router = router
            .fallback(move |State(state): State<AppState>, request: Request| {
                let index = Arc::clone(&index);
                async move { route_miss(&index, &state, request).await }
            })
            .with_state(state);

        compose(router, config)
    }
}

fn apply_route_stage(
    handler: MethodRouter<AppState>,
    stage: RouteStage,
    state: &AppState,
) -> MethodRouter<AppState> {
    match stage {
        RouteStage::Session => handler.route_layer(state.sessions.clone()),
        RouteStage::Csrf => handler.route_layer(middleware::from_fn_with_state(
            state.csrf.clone(),
            csrf_middleware,
        )),
        RouteStage::RedirectAuthenticated => {
            handler.route_layer(middleware::from_fn(redirect_if_authenticated))
        }
        RouteStage::RequireAuthentication => handler.route_layer(
            middleware::from_fn_with_state(state.users.clone(), require_authentication),
        ),
    }
}

/// Wrap `router` in the server-wide stages. The first stage listed by
/// [`RouterConfig::server_stages`] ends up outermost.
pub fn compose(router: Router, config: &RouterConfig) -> Router {
    config
        .server_stages()
        .into_iter()
        .rev()
        .fold(router, |router, stage| match stage {
            ServerStage::PanicRecovery => router.layer(CatchPanicLayer::custom(handle_panic)),
            ServerStage::AccessLog => router.layer(
                TraceLayer::new_for_http()
                    .make_span_with(request_span)
                    .on_response(log_response),
            ),
            ServerStage::SecurityHeaders => router.layer(middleware::from_fn(secure_headers)),
        })
}

async fn route_miss(table: &RouteTable, state: &AppState, request: Request) -> Response {
    match table.dispatch(request.method(), request.uri().path()) {
        Dispatch::MethodNotAllowed(methods) => {
            debug!(method = %request.method(), uri = %request.uri(), "Method not allowed");
            let allow = methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            let mut response = (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response();
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(ALLOW, value);
            }
            response
        }
        Dispatch::Found(_) | Dispatch::NotFound => {
            debug!(method = %request.method(), uri = %request.uri(), "No route matched");
            not_found_page(state).await
        }
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// The application's route table.
pub fn app_routes() -> Result<RouteTable, RouteError> {
    let mut table = RouteTable::new();

    table.register(Method::GET, "/static/*path", RoutePolicy::Static, serve_static)?;

    table.register(Method::GET, "/", RoutePolicy::Dynamic, home)?;
    table.register(Method::GET, "/snippet/views/:id", RoutePolicy::Dynamic, snippet_view)?;

    table.register(Method::GET, "/user/signup", RoutePolicy::Guest, user_signup_form)?;
    table.register(Method::POST, "/user/signup", RoutePolicy::Guest, user_signup)?;
    table.register(Method::GET, "/user/login", RoutePolicy::Guest, user_login_form)?;
    table.register(Method::POST, "/user/login", RoutePolicy::Guest, user_login)?;

    table.register(Method::POST, "/user/logout", RoutePolicy::Protected, user_logout)?;
    table.register(Method::GET, "/snippet/views", RoutePolicy::Protected, snippet_create_form)?;
    table.register(Method::POST, "/snippet/views", RoutePolicy::Protected, snippet_create)?;

    Ok(table)
}

/// Create the main application router.
///
/// # Arguments
///
/// * `state` - Stores, renderer, session layer and CSRF guard
/// * `config` - Router configuration
pub fn create_router(state: AppState, config: RouterConfig) -> Result<Router, RouteError> {
    Ok(app_routes()?.into_router(state, &config))
}

// =============================================================================
// Tests
// =============================================================================
