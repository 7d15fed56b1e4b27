//! Configuration management for snippetbox.
//!
//! Every option can be given on the command line or through an environment
//! variable with the `SNIPPETBOX_` prefix:
//!
//! - `SNIPPETBOX_HOST` - Server bind address (default: 0.0.0.0)
//! - `SNIPPETBOX_PORT` - Server port (default: 4000)
//! - `SNIPPETBOX_TEMPLATES_DIR` - Template directory (default: ./ui/html)
//! - `SNIPPETBOX_STATIC_DIR` - Static asset directory (default: ./ui/static)
//! - `SNIPPETBOX_SESSION_LIFETIME_HOURS` - Session lifetime (default: 12)
//! - `SNIPPETBOX_SESSION_CAPACITY` - Max sessions kept in memory (default: 10000)
//! - `SNIPPETBOX_SESSION_CLEANUP_SECS` - Expired-session sweep interval (default: 600)
//! - `SNIPPETBOX_SECURE_COOKIES` - Mark cookies `Secure` (default: true)
//! - `SNIPPETBOX_CSRF_SECRET` - CSRF signing secret (default: random per process)

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::server::RouterConfig;
use crate::session::DEFAULT_SESSION_CAPACITY;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 4000;

/// Default template directory.
pub const DEFAULT_TEMPLATES_DIR: &str = "./ui/html";

/// Default static asset directory.
pub const DEFAULT_STATIC_DIR: &str = "./ui/static";

/// Default session lifetime in hours.
pub const DEFAULT_SESSION_LIFETIME_HOURS: u64 = 12;

/// Longest accepted session lifetime in hours (one year).
pub const MAX_SESSION_LIFETIME_HOURS: u64 = 24 * 365;

/// Default interval between expired-session sweeps, in seconds.
pub const DEFAULT_SESSION_CLEANUP_SECS: u64 = 600;

/// Minimum length of a configured CSRF secret.
pub const MIN_CSRF_SECRET_BYTES: usize = 32;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Snippetbox - share snippets of text.
#[derive(Parser, Debug, Clone)]
#[command(name = "snippetbox")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "SNIPPETBOX_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "SNIPPETBOX_PORT")]
    pub port: u16,

    /// Directory holding base.html, partials/ and pages/.
    #[arg(long, default_value = DEFAULT_TEMPLATES_DIR, env = "SNIPPETBOX_TEMPLATES_DIR")]
    pub templates_dir: PathBuf,

    /// Directory served under /static.
    #[arg(long, default_value = DEFAULT_STATIC_DIR, env = "SNIPPETBOX_STATIC_DIR")]
    pub static_dir: PathBuf,

    // =========================================================================
    // Session Configuration
    // =========================================================================
    /// Hours a session stays valid after it was issued or renewed.
    #[arg(
        long,
        default_value_t = DEFAULT_SESSION_LIFETIME_HOURS,
        env = "SNIPPETBOX_SESSION_LIFETIME_HOURS"
    )]
    pub session_lifetime_hours: u64,

    /// Maximum number of sessions kept in memory; least recently used go first.
    #[arg(long, default_value_t = DEFAULT_SESSION_CAPACITY, env = "SNIPPETBOX_SESSION_CAPACITY")]
    pub session_capacity: usize,

    /// Seconds between sweeps of expired sessions.
    #[arg(
        long,
        default_value_t = DEFAULT_SESSION_CLEANUP_SECS,
        env = "SNIPPETBOX_SESSION_CLEANUP_SECS"
    )]
    pub session_cleanup_secs: u64,

    /// Mark session and CSRF cookies `Secure`.
    ///
    /// Browsers only send secure cookies over HTTPS; disable for plain-HTTP
    /// local development with `--secure-cookies=false`.
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        env = "SNIPPETBOX_SECURE_COOKIES"
    )]
    pub secure_cookies: bool,

    // =========================================================================
    // CSRF Configuration
    // =========================================================================
    /// Secret used to derive CSRF tokens (at least 32 bytes).
    ///
    /// If not provided a random secret is generated, and outstanding forms
    /// stop validating when the server restarts.
    #[arg(long, env = "SNIPPETBOX_CSRF_SECRET")]
    pub csrf_secret: Option<String>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable the per-request access log.
    #[arg(long, default_value_t = false)]
    pub no_access_log: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.session_lifetime_hours == 0 {
            return Err("session_lifetime_hours must be greater than 0".to_string());
        }
        if self.session_lifetime_hours > MAX_SESSION_LIFETIME_HOURS {
            return Err(format!(
                "session_lifetime_hours must be at most {}",
                MAX_SESSION_LIFETIME_HOURS
            ));
        }
        if self.session_capacity == 0 {
            return Err("session_capacity must be greater than 0".to_string());
        }
        if self.session_cleanup_secs == 0 {
            return Err("session_cleanup_secs must be greater than 0".to_string());
        }

        if let Some(ref secret) = self.csrf_secret {
            if secret.len() < MIN_CSRF_SECRET_BYTES {
                return Err(format!(
                    "CSRF secret must be at least {} bytes. \
                     Set --csrf-secret or SNIPPETBOX_CSRF_SECRET, or omit it for a random secret",
                    MIN_CSRF_SECRET_BYTES
                ));
            }
        }

        Ok(())
    }

    /// Get the bind address as a string (host:port).
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Idle time after which a session expires.
    pub fn session_lifetime(&self) -> time::Duration {
        let hours = self.session_lifetime_hours.min(MAX_SESSION_LIFETIME_HOURS);
        time::Duration::hours(hours as i64)
    }

    pub fn session_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.session_cleanup_secs)
    }

    /// Router-level switches derived from this configuration.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig::new().with_access_log(!self.no_access_log)
    }
}
