use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::convert::Infallible;
use std::time::Duration;
use tower_sessions::Session;

use crate::{error::AppError, repository::UserStore, session};

/// Route the login gate sends anonymous visitors to.
pub const LOGIN_PATH: &str = "/login";
/// Where authenticated visitors of guest-only pages are sent instead.
pub const AUTHENTICATED_HOME_PATH: &str = "/events";

/// AuthState
///
/// The authentication status of a single request, resolved once by [`authenticate`]
/// and immutable afterwards. The login gate, the guest-only redirect and the
/// templates all read this value and never the session directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Anonymous,
    Authenticated { user_id: i64 },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }
}

/// AuthState Extractor Implementation
///
/// Lets handlers and later stages take `AuthState` as an argument. When the
/// authentication stage did not run for a route the request is treated as anonymous,
/// so a missing stage can only ever deny access, never grant it.
impl<S> FromRequestParts<S> for AuthState
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<AuthState>().copied().unwrap_or_default())
    }
}

/// authenticate
///
/// Authentication-resolution stage.
///
/// 1. No user id in the session: anonymous, and no store lookup at all.
/// 2. A user id is present: it is re-validated against the user store on every
///    request, so a deleted account loses access on its very next request.
/// 3. Store failure: the request ends with a 500.
///
/// A stale id (user no longer exists) is left in the session. The request proceeds as
/// anonymous and the value stays until an explicit logout removes it.
pub async fn authenticate(
    State(users): State<UserStore>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Response {
    let user_id = match session.get::<i64>(session::AUTH_USER_KEY).await {
        Ok(id) => id.unwrap_or(0),
        Err(e) => {
            tracing::warn!(error = %e, "session value unreadable, treating request as anonymous");
            0
        }
    };

    if user_id == 0 {
        request.extensions_mut().insert(AuthState::Anonymous);
        return next.run(request).await;
    }

    let state = match users.exists(user_id).await {
        Ok(true) => AuthState::Authenticated { user_id },
        Ok(false) => {
            tracing::debug!(user_id, "session refers to a user that no longer exists");
            AuthState::Anonymous
        }
        Err(e) => return AppError::from(e).into_response(),
    };

    request.extensions_mut().insert(state);
    next.run(request).await
}

/// require_login
///
/// Login-required gate for protected routes. Anonymous requests are redirected (303)
/// to the login page; authenticated responses are marked `no-store` so protected
/// pages never land in a shared cache.
pub async fn require_login(auth: AuthState, request: Request, next: Next) -> Response {
    if !auth.is_authenticated() {
        return Redirect::to(LOGIN_PATH).into_response();
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// redirect_authenticated
///
/// Guest-only gate for the login and registration pages.
pub async fn redirect_authenticated(auth: AuthState, request: Request, next: Next) -> Response {
    if auth.is_authenticated() {
        return Redirect::to(AUTHENTICATED_HOME_PATH).into_response();
    }
    next.run(request).await
}

// --- State transitions ---

/// login
///
/// `Anonymous -> Authenticated(id)`: the token is rotated first, then the user id
/// is written under the new token.
pub async fn login(
    session: &Session,
    user_id: i64,
    lifetime: Duration,
) -> Result<(), tower_sessions::session::Error> {
    session::renew(session, lifetime).await?;
    session.insert(session::AUTH_USER_KEY, user_id).await
}

/// logout
///
/// `Authenticated(id) -> Anonymous`: the token is rotated and the user id removed.
/// Other values (CSRF secret, flash) survive the rotation.
pub async fn logout(
    session: &Session,
    lifetime: Duration,
) -> Result<(), tower_sessions::session::Error> {
    session::renew(session, lifetime).await?;
    session.remove::<i64>(session::AUTH_USER_KEY).await?;
    Ok(())
}
