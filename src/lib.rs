use axum::{Router, extract::FromRef, http::StatusCode, middleware::from_fn};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tower_sessions::SessionStore;

// --- Module Structure ---

// Request pipeline stages.
pub mod auth;
pub mod csrf;
pub mod middleware;
pub mod session;

// Rendering, input and persistence collaborators.
pub mod forms;
pub mod models;
pub mod password;
pub mod repository;
pub mod templates;
pub mod validator;

// Application surface and process setup.
pub mod config;
pub mod error;
pub mod handlers;
pub mod telemetry;

// Route groups, one per middleware chain (bare, public, protected).
pub mod routes;
use routes::{protected, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{EventStore, SqliteEventRepository, SqliteUserRepository, UserStore};
pub use templates::TemplateCache;

/// AppState
///
/// The dependencies every request shares, constructed once at startup and never
/// mutated afterwards. Nothing request-specific lives here: per-request values (auth
/// state, CSRF token, flash) travel in request extensions and `TemplateData`.
#[derive(Clone)]
pub struct AppState {
    pub events: EventStore,
    pub users: UserStore,
    pub templates: Arc<TemplateCache>,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Middleware stages pull only the piece of state they need.

impl FromRef<AppState> for UserStore {
    fn from_ref(app_state: &AppState) -> UserStore {
        app_state.users.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the whole request pipeline.
///
/// Outer chain, for every request: panic recovery → request id → request logging →
/// request id propagation → security headers → timeout. The dispatcher then picks the
/// route-specific inner chain (bare, public or protected).
pub fn create_router<Store>(state: AppState, session_store: Store) -> Router
where
    Store: SessionStore + Clone,
{
    let sessions = session::session_layer(
        session_store,
        state.config.session_lifetime,
        state.config.secure_cookies,
    );
    let request_timeout = state.config.request_timeout;

    // 1. Dispatcher with the per-group inner chains
    let base_router = Router::new()
        .merge(routes::bare_routes())
        .merge(public::public_routes(&state, sessions.clone()))
        .merge(protected::protected_routes(&state, sessions))
        .fallback(handlers::not_found)
        .with_state(state);

    // 2. Outer chain (first layer listed is outermost)
    base_router.layer(
        ServiceBuilder::new()
            .layer(from_fn(middleware::recover_panic))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(middleware::trace_span_logger)
                    .on_request(middleware::log_request)
                    .on_response(middleware::log_response),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(from_fn(middleware::secure_headers))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::SERVICE_UNAVAILABLE,
                request_timeout,
            )),
    )
}
