//! CSRF protection stage.
//!
//! A random secret is bound to the session the first time a page is served. Safe
//! requests get that token in their extensions (so templates can embed it); unsafe
//! requests must echo it back in the `csrf_token` form field or the `X-CSRF-Token`
//! header, or they are rejected with 400 before any handler runs. The secret lives for
//! the whole session; it is not rotated per request.

use axum::{
    body::{Body, to_bytes},
    extract::{FromRequestParts, Request, State},
    http::{Method, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use std::convert::Infallible;
use std::time::Duration;
use tower_sessions::Session;

use crate::{config::AppConfig, error::AppError, session};

/// Session key under which the per-session secret is stored.
pub const CSRF_SESSION_KEY: &str = "csrfToken";
/// Hidden form field carrying the token on form posts.
pub const CSRF_FORM_FIELD: &str = "csrf_token";
/// Header alternative for non-form clients.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Upper bound on a form body buffered while looking for the token.
const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

/// CsrfToken
///
/// The session's token, made available to handlers after the stage has run.
/// Extracting it never fails; outside the stage it is simply empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<CsrfToken>().cloned().unwrap_or_default())
    }
}

/// Generates a fresh 256-bit token, URL-safe base64 encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Constant-time comparison of a submitted token against the session secret.
pub fn tokens_match(submitted: &str, expected: &str) -> bool {
    !expected.is_empty() && constant_time_eq::constant_time_eq(submitted.as_bytes(), expected.as_bytes())
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// protect
///
/// The CSRF stage. Must sit inside the session stage, since the secret lives in the
/// session, and before the login gate, so that a forged request is rejected as
/// forged no matter what the login state is.
pub async fn protect(
    State(config): State<AppConfig>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    let stored = match session.get::<String>(CSRF_SESSION_KEY).await {
        Ok(token) => token,
        Err(e) => return AppError::server(e).into_response(),
    };

    if is_safe_method(request.method()) {
        let token = match stored {
            Some(token) => token,
            None => match issue_token(&session, config.session_lifetime).await {
                Ok(token) => token,
                Err(e) => return AppError::server(e).into_response(),
            },
        };
        return next.run(with_token(request, token)).await;
    }

    let Some(expected) = stored else {
        return reject("no CSRF token bound to session");
    };

    let (request, submitted) = match submitted_token(request).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    match submitted {
        Some(submitted) if tokens_match(&submitted, &expected) => {
            next.run(with_token(request, expected)).await
        }
        Some(_) => reject("CSRF token mismatch"),
        None => reject("CSRF token missing"),
    }
}

/// Binds a brand-new secret to the session. This is also the moment an anonymous
/// session first receives a value, so its lifetime starts here.
async fn issue_token(session: &Session, lifetime: Duration) -> Result<String, tower_sessions::session::Error> {
    let token = generate_token();
    session.insert(CSRF_SESSION_KEY, &token).await?;
    session::stamp_lifetime(session, lifetime).await?;
    Ok(token)
}

fn with_token(mut request: Request, token: String) -> Request {
    request.extensions_mut().insert(CsrfToken(token));
    request
}

fn reject(reason: &str) -> Response {
    AppError::client(StatusCode::BAD_REQUEST, reason).into_response()
}

/// submitted_token
///
/// Looks for the token in the header first, then in an urlencoded form body. A body
/// that had to be read is put back so the handler's `Form` extractor still sees it.
async fn submitted_token(request: Request) -> Result<(Request, Option<String>), Response> {
    if let Some(token) = request
        .headers()
        .get(CSRF_HEADER_NAME)
        .and_then(|value| value.to_str().ok())
    {
        let token = token.to_string();
        return Ok((request, Some(token)));
    }

    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if !is_form {
        return Ok((request, None));
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|e| AppError::bad_request(format!("unreadable form body: {e}")).into_response())?;

    let token = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&bytes)
        .ok()
        .and_then(|fields| {
            fields
                .into_iter()
                .find(|(name, _)| name == CSRF_FORM_FIELD)
                .map(|(_, value)| value)
        });

    Ok((Request::from_parts(parts, Body::from(bytes)), token))
}
