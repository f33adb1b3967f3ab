use clap::Parser;
use std::{env, time::Duration};

/// Default lifetime of a session, counted from issuance or the last renewal.
pub const SESSION_LIFETIME: Duration = Duration::from_secs(12 * 60 * 60);
/// Upper bound on the time a single request may take to produce its response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Database used in local runs when `DATABASE_URL` is not set.
pub const LOCAL_DATABASE_URL: &str = "sqlite://events.db?mode=rwc";

/// Cli
///
/// Command-line flags. The listening port is the only setting taken from the command
/// line; everything else comes from the environment.
#[derive(Debug, Parser)]
#[command(name = "event-planner", about = "Server-rendered event planner")]
pub struct Cli {
    /// HTTP network port
    #[arg(long, default_value = "4000")]
    pub port: u16,
}

/// AppConfig
///
/// The application's configuration, loaded once at startup and immutable afterwards.
/// Handlers and middleware stages pull it out of `AppState` via `FromRef`.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Selects the log format and which settings are mandatory.
    pub env: Env,
    // SQLite connection string, shared by the application data and the session store.
    pub db_url: String,
    pub session_lifetime: Duration,
    // Marks the session cookie `Secure`. Only tests turn this off.
    pub secure_cookies: bool,
    pub request_timeout: Duration,
    pub port: u16,
}

/// Env
///
/// The runtime context: human-readable logs and fallback settings locally, JSON logs
/// and explicit settings in production.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// A non-panicking configuration for test setup; nothing is read from the environment.
    fn default() -> Self {
        Self {
            env: Env::Local,
            db_url: "sqlite::memory:".to_string(),
            session_lifetime: SESSION_LIFETIME,
            secure_cookies: true,
            request_timeout: REQUEST_TIMEOUT,
            port: 4000,
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from the environment (call `dotenv::dotenv()` first) and
    /// takes the port from the parsed command line.
    ///
    /// # Panics
    /// Panics if `DATABASE_URL` is missing while `APP_ENV=production`, so a production
    /// process never starts against a throwaway local database.
    pub fn load(cli: &Cli) -> Self {
        let env = match env::var("APP_ENV").as_deref() {
            Ok("production") => Env::Production,
            _ => Env::Local,
        };

        let db_url = match env {
            Env::Production => env::var("DATABASE_URL")
                .expect("FATAL: DATABASE_URL must be set in production."),
            Env::Local => {
                env::var("DATABASE_URL").unwrap_or_else(|_| LOCAL_DATABASE_URL.to_string())
            }
        };

        Self {
            env,
            db_url,
            session_lifetime: SESSION_LIFETIME,
            secure_cookies: true,
            request_timeout: REQUEST_TIMEOUT,
            port: cli.port,
        }
    }
}
