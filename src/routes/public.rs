use crate::{AppState, auth, csrf, handlers, session};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_sessions::{SessionManagerLayer, SessionStore};

/// Public Router Module
///
/// Endpoints reachable by anonymous and logged-in visitors alike. They still run the
/// full inner chain (session load/save, CSRF, authentication resolution) so that
/// every page can embed a CSRF token and reflect the login state, and every form post
/// is checked for forgery.
pub fn public_routes<Store>(state: &AppState, sessions: SessionManagerLayer<Store>) -> Router<AppState>
where
    Store: SessionStore + Clone,
{
    Router::new()
        // GET /
        .route("/", get(handlers::home))
        // GET /events
        .route("/events", get(handlers::event_list))
        // GET /events/detail/{id}
        // Non-numeric or non-positive ids are answered with 404 by the handler.
        .route("/events/detail/{id}", get(handlers::event_detail))
        // POST /logout
        // Public on purpose: logging out an already anonymous session is harmless.
        .route("/logout", post(handlers::logout))
        .merge(guest_routes())
        .route_layer(
            ServiceBuilder::new()
                .layer(sessions)
                .layer(middleware::from_fn(session::keep_lifetime))
                .layer(middleware::from_fn_with_state(state.clone(), csrf::protect))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::authenticate,
                )),
        )
}

/// guest_routes
///
/// Login and registration. A visitor who is already logged in is sent to the events
/// list instead. The guard sits inside the public chain, after authentication
/// resolution, because it reads the resolved `AuthState`.
fn guest_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /register
        .route(
            "/register",
            get(handlers::register_form).post(handlers::register),
        )
        // GET/POST /login
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route_layer(middleware::from_fn(auth::redirect_authenticated))
}
