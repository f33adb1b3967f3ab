//! Session load/save stage and the helpers handlers use to mutate session state.
//!
//! Loading, saving and cookie re-issuing are done by `tower_sessions::SessionManagerLayer`.
//! A missing, malformed or expired cookie yields a fresh anonymous session rather
//! than an error.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use time::{Duration, OffsetDateTime};
use tower_sessions::{
    Expiry, Session, SessionManagerLayer, SessionStore, cookie::SameSite, session::Error,
};

use crate::error::AppError;

/// Cookie that carries the opaque session token.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Session key holding the id of the logged-in user. Absent means anonymous.
pub const AUTH_USER_KEY: &str = "authenticatedUserID";

/// Session key of the one-shot message shown on the next rendered page.
pub const FLASH_KEY: &str = "flash";

/// Session key holding the absolute expiry (unix milliseconds) set at issuance or renewal.
pub const EXPIRES_AT_KEY: &str = "expiresAt";

/// session_layer
///
/// Builds the session stage over any store. The layer only writes a session back
/// when a request modified it, and the lifetime given here is only the fallback;
/// [`stamp_lifetime`] pins an absolute expiry whenever a session is issued or renewed.
pub fn session_layer<Store>(
    store: Store,
    lifetime: std::time::Duration,
    secure: bool,
) -> SessionManagerLayer<Store>
where
    Store: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_http_only(true)
        .with_secure(secure)
        .with_path("/")
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(to_time_duration(lifetime)))
}

/// stamp_lifetime
///
/// Sets the session to expire `lifetime` from now. The deadline is stored in the
/// session too, so [`keep_lifetime`] can re-apply it when a later request writes
/// the session back.
pub async fn stamp_lifetime(session: &Session, lifetime: std::time::Duration) -> Result<(), Error> {
    let expires_at = OffsetDateTime::now_utc() + to_time_duration(lifetime);
    let millis = (expires_at.unix_timestamp_nanos() / 1_000_000) as i64;
    session.insert(EXPIRES_AT_KEY, millis).await?;
    session.set_expiry(Some(Expiry::AtDateTime(expires_at)));
    Ok(())
}

/// keep_lifetime
///
/// Runs right after the session layer. Untouched sessions are not saved at all, so
/// their stored expiry and cookie stay as they are. A session the request did modify
/// would be saved with the layer's sliding expiry; this pins it back to the stored
/// deadline first, so a session lives exactly `lifetime` from its issuance or last
/// renewal.
pub async fn keep_lifetime(session: Session, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if !session.is_modified() {
        return response;
    }

    match stored_deadline(&session).await {
        Ok(Some(expires_at)) => {
            session.set_expiry(Some(Expiry::AtDateTime(expires_at)));
            response
        }
        Ok(None) => response,
        Err(e) => AppError::server(e).into_response(),
    }
}

async fn stored_deadline(session: &Session) -> Result<Option<OffsetDateTime>, Error> {
    let millis = session.get::<i64>(EXPIRES_AT_KEY).await?;
    Ok(millis.and_then(|ms| {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
    }))
}

/// renew
///
/// Rotates the session token while keeping every stored value, then restarts the
/// lifetime. Called on each privilege change so a token fixated beforehand is useless.
pub async fn renew(session: &Session, lifetime: std::time::Duration) -> Result<(), Error> {
    session.cycle_id().await?;
    stamp_lifetime(session, lifetime).await
}

pub async fn put_flash(session: &Session, message: &str) -> Result<(), Error> {
    session.insert(FLASH_KEY, message).await
}

/// Removes and returns the pending flash message, if any. A session without one is
/// left unmodified, so rendering a page does not force a write.
pub async fn pop_flash(session: &Session) -> Result<Option<String>, Error> {
    if session.get::<String>(FLASH_KEY).await?.is_none() {
        return Ok(None);
    }
    session.remove::<String>(FLASH_KEY).await
}

fn to_time_duration(lifetime: std::time::Duration) -> Duration {
    Duration::try_from(lifetime).unwrap_or(Duration::hours(12))
}
