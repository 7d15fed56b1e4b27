//! Snippetbox - share snippets of text.
//!
//! This binary parses the configuration, builds every component and serves
//! the composed router.

use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snippetbox::{
    config::Config,
    create_router, session_layer, AppState, CsrfGuard, ExpiredDeletion, MemorySessionStore,
    MemorySnippetStore, MemoryUserStore, Renderer, TemplateCache,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration:");
    info!("  Templates: {}", config.templates_dir.display());
    info!("  Static files: {}", config.static_dir.display());
    info!(
        "  Sessions: {}h lifetime, up to {} kept, swept every {}s",
        config.session_lifetime_hours, config.session_capacity, config.session_cleanup_secs
    );
    if !config.secure_cookies {
        warn!("  Cookies: NOT marked Secure - only use this over plain HTTP in development");
    }
    if config.csrf_secret.is_none() {
        info!("  CSRF secret: random (forms issued before a restart will be rejected)");
    }

    // Parse every template up front; a broken page stops startup
    let templates = match TemplateCache::from_dir(&config.templates_dir) {
        Ok(templates) => templates,
        Err(e) => {
            error!("Failed to load templates: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("  Pages: {}", templates.pages().collect::<Vec<_>>().join(", "));

    // Sessions
    let session_store = Arc::new(MemorySessionStore::with_capacity(config.session_capacity));
    let sessions = session_layer(
        session_store.clone(),
        config.session_lifetime(),
        config.secure_cookies,
    );
    spawn_session_cleanup(session_store, config.session_cleanup_interval());

    // CSRF
    let csrf = match config.csrf_secret {
        Some(ref secret) => CsrfGuard::new(secret),
        None => CsrfGuard::random(),
    }
    .with_secure_cookies(config.secure_cookies);

    let state = AppState::new(
        Arc::new(MemorySnippetStore::new()),
        Arc::new(MemoryUserStore::new()),
        Renderer::new(templates),
        sessions,
        csrf,
        &config.static_dir,
    );

    let router = match create_router(state, config.router_config()) {
        Ok(router) => router,
        Err(e) => {
            error!("Failed to build routes: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Bind and serve
    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on: http://{}", addr);

    let service = router.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, service).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "snippetbox=debug,tower_http=debug"
    } else {
        "snippetbox=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Periodically drop expired sessions from the store.
fn spawn_session_cleanup(store: Arc<MemorySessionStore>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.delete_expired().await {
                Ok(()) => {
                    let remaining = store.len().await;
                    debug!(remaining, "Swept expired sessions")
                }
                Err(e) => warn!("Session cleanup failed: {}", e),
            }
        }
    });
}
