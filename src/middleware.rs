//! Outer middleware chain: panic recovery, request logging and security headers.
//!
//! These run for every request, including static assets, before the dispatcher picks
//! a route-specific chain.

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use futures_util::FutureExt;
use std::{any::Any, net::SocketAddr, panic::AssertUnwindSafe, time::Duration};
use tracing::Span;

use crate::error::status_text_response;

/// Content-Security-Policy: everything from self, plus the CDN and icon hosts the
/// pages pull scripts, styles, images and fonts from.
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self' https://cdn.jsdelivr.net https://*.iconify.design https://*.simplesvg.com https://*.unisvg.com; \
    style-src 'self' https://cdn.jsdelivr.net; \
    img-src 'self' data: https://cdn.jsdelivr.net https://*.iconify.design https://*.simplesvg.com https://*.unisvg.com; \
    font-src 'self' https://cdn.jsdelivr.net; \
    connect-src 'self' https://*.iconify.design https://*.simplesvg.com https://*.unisvg.com";

/// recover_panic
///
/// Outermost stage. A panic anywhere downstream is caught here and turned into a
/// generic 500 with `Connection: close`; the process and every other in-flight request
/// carry on. The panic hook installed at startup has already logged the stack trace
/// at the panic site, so this log line adds the request it happened in.
///
/// Session mutations that were already persisted before the panic are not rolled back.
pub async fn recover_panic(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            tracing::error!(
                method = %method,
                url = %uri,
                panic = %panic_message(payload.as_ref()),
                "request handler panicked"
            );
            let mut response = status_text_response(StatusCode::INTERNAL_SERVER_ERROR);
            let headers = response.headers_mut();
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
            apply_security_headers(headers);
            response
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// secure_headers
///
/// Sets the fixed security headers on every response, overriding anything set
/// further down the chain.
pub async fn secure_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    apply_security_headers(response.headers_mut());
    response
}

/// The header set written by [`secure_headers`]. The recovery stage applies it too,
/// since a panic unwinds past `secure_headers` before it can touch the response.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("origin-when-cross-origin"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("deny"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("0"));
}

// --- Request logging (TraceLayer hooks) ---

/// trace_span_logger
///
/// Helper used by `TraceLayer` to build the per-request span. Every log line emitted
/// while the request is handled (including error logs from handlers) carries these
/// fields.
pub fn trace_span_logger(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        url = %request.uri(),
        proto = ?request.version(),
        ip = %client_addr(request),
        req_id = %request_id,
    )
}

/// log_request
///
/// `on_request` hook: records the request before it is delegated. Never
/// short-circuits.
pub fn log_request(request: &Request, _span: &Span) {
    tracing::info!(
        ip = %client_addr(request),
        proto = ?request.version(),
        method = %request.method(),
        url = %request.uri(),
        "request"
    );
}

/// log_response
///
/// `on_response` hook: status and latency once the response is ready.
pub fn log_response(response: &Response, latency: Duration, _span: &Span) {
    tracing::info!(
        status = response.status().as_u16(),
        latency_ms = latency.as_millis() as u64,
        "response"
    );
}

fn client_addr(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
