use crate::{AppState, auth, csrf, handlers, session};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_sessions::{SessionManagerLayer, SessionStore};

/// Protected Router Module
///
/// Event management, available to logged-in users only.
///
/// Chain order: session → CSRF → authentication resolution → login gate. CSRF runs
/// before the gate, so an anonymous forged POST gets the CSRF rejection (400) rather
/// than the login redirect, and the response never tells an attacker whether the
/// victim's session is logged in.
pub fn protected_routes<Store>(
    state: &AppState,
    sessions: SessionManagerLayer<Store>,
) -> Router<AppState>
where
    Store: SessionStore + Clone,
{
    Router::new()
        // GET/POST /events/create
        .route(
            "/events/create",
            get(handlers::event_create_form).post(handlers::event_create),
        )
        // GET/POST /events/{id}/edit
        .route(
            "/events/{id}/edit",
            get(handlers::event_edit_form).post(handlers::event_update),
        )
        // POST /events/{id}/delete
        .route("/events/{id}/delete", post(handlers::event_delete))
        .route_layer(
            ServiceBuilder::new()
                .layer(sessions)
                .layer(middleware::from_fn(session::keep_lifetime))
                .layer(middleware::from_fn_with_state(state.clone(), csrf::protect))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::authenticate,
                ))
                .layer(middleware::from_fn(auth::require_login)),
        )
}
