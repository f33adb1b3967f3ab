//! Error classification at the HTTP boundary.
//!
//! Every failure a handler or middleware stage can hit ends up in one of three buckets:
//! a client error (4xx, logged at warn), a missing record (404, not logged as an error)
//! or a server fault (500, logged with a backtrace). The response body is always the
//! canonical status text and never contains the underlying error.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::backtrace::Backtrace;

use crate::{models::ModelError, templates::TemplateError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The request itself was unacceptable (malformed form, forged token, bad id).
    #[error("client error {status}: {reason}")]
    Client { status: StatusCode, reason: String },
    #[error("resource not found")]
    NotFound,
    /// Anything unexpected: persistence failures, template faults, store outages.
    #[error(transparent)]
    Server(#[from] anyhow::Error),
}

impl AppError {
    pub fn client(status: StatusCode, reason: impl Into<String>) -> Self {
        Self::Client {
            status,
            reason: reason.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::client(StatusCode::BAD_REQUEST, reason)
    }

    pub fn server(err: impl Into<anyhow::Error>) -> Self {
        Self::Server(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Client { status, .. } => *status,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NoRecord => AppError::NotFound,
            other => AppError::Server(other.into()),
        }
    }
}

impl From<TemplateError> for AppError {
    fn from(err: TemplateError) -> Self {
        AppError::Server(err.into())
    }
}

impl IntoResponse for AppError {
    /// into_response
    ///
    /// Runs inside the request's `http_request` span, so method and URL are attached
    /// to the log line by the tracing subscriber.
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Client { reason, .. } => {
                tracing::warn!(status = status.as_u16(), reason = %reason, "client error");
            }
            AppError::NotFound => {
                tracing::debug!("record not found");
            }
            AppError::Server(err) => {
                let trace = Backtrace::force_capture();
                tracing::error!(error = ?err, trace = %trace, "server error");
            }
        }
        status_text_response(status)
    }
}

/// A plain-text response whose body is just the canonical reason phrase.
pub fn status_text_response(status: StatusCode) -> Response {
    let body = status.canonical_reason().unwrap_or("Error");
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
