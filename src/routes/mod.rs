/// Router Module Index
///
/// Routes are grouped by the middleware chain they run behind. Each group applies its
/// own chain with `route_layer`, so a route's protection is decided by the module it is
/// declared in and cannot be forgotten at the call site.

/// Pages anyone may see: session, CSRF and authentication resolution.
pub mod public;

/// Pages behind the login gate: the public chain plus `require_login`.
pub mod protected;

use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// bare_routes
///
/// Routes served without the session chain: the liveness probe and the embedded
/// static assets. No session is loaded or created for them.
pub fn bare_routes() -> Router<AppState> {
    Router::new()
        // GET /ping
        .route("/ping", get(handlers::ping))
        // GET /static/{*path}
        // Read-only files embedded from ui/static/.
        .route("/static/{*path}", get(handlers::serve_static))
}
