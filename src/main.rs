use anyhow::Context;
use clap::Parser;
use event_planner::{
    AppState,
    config::{AppConfig, Cli},
    create_router,
    repository::{EventStore, SqliteEventRepository, SqliteUserRepository, UserStore},
    telemetry,
    templates::TemplateCache,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower_sessions::session_store::ExpiredDeletion;
use tower_sessions_sqlx_store::SqliteStore;

/// How often expired session rows are purged from the store.
const SESSION_CLEANUP_PERIOD: Duration = Duration::from_secs(5 * 60);

/// main
///
/// Startup order: configuration, logging, database and migrations, session store,
/// template cache, then the HTTP server. Any failure before the listener is bound
/// aborts the process with the error chain.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Configuration (fail-fast for missing production settings)
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load(&cli);

    // 2. Logging and panic reporting
    telemetry::init_tracing(config.env);
    telemetry::install_panic_hook();
    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .with_context(|| format!("connecting to {}", config.db_url))?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running database migrations")?;

    let events = Arc::new(SqliteEventRepository::new(pool.clone())) as EventStore;
    let users = Arc::new(SqliteUserRepository::new(pool.clone())) as UserStore;

    // 4. Session store, sharing the application pool
    let session_store = SqliteStore::new(pool);
    session_store
        .migrate()
        .await
        .context("creating the session table")?;
    tokio::spawn(delete_expired_sessions(session_store.clone()));

    // 5. Template cache. A template that does not compile stops startup here.
    let templates = TemplateCache::new().context("building the template cache")?;
    tracing::info!(pages = templates.pages().count(), "template cache ready");

    // 6. Router and server
    let port = config.port;
    let app_state = AppState {
        events,
        users,
        templates: Arc::new(templates),
        config,
    };
    let app = create_router(app_state, session_store);

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    tracing::info!(address = %listener.local_addr()?, "HTTP server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving HTTP")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Periodically removes sessions whose expiry has passed.
async fn delete_expired_sessions(store: SqliteStore) {
    let mut interval = tokio::time::interval(SESSION_CLEANUP_PERIOD);
    loop {
        interval.tick().await;
        if let Err(e) = store.delete_expired().await {
            tracing::warn!(error = %e, "deleting expired sessions failed");
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
