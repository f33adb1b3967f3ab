use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// --- Core Application Schemas (Mapped to Database) ---

/// Event
///
/// A scheduled occurrence stored in the `events` table. This is the primary data
/// structure browsed by visitors and managed by authenticated users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub location: String,
    // Calendar date only; stored as `YYYY-MM-DD`.
    pub event_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// NewEvent
///
/// The writable fields of an event, shared by the create and update operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub location: String,
    pub event_date: NaiveDate,
}

// --- Persistence Errors ---

/// ModelError
///
/// The sentinel errors returned by the persistence collaborator. Handlers classify
/// these at the HTTP boundary; none of them ever reaches a response body verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// No row matched the requested id (or a delete/update touched zero rows).
    #[error("models: no matching record found")]
    NoRecord,
    /// A user with the submitted email address already exists.
    #[error("models: duplicate email")]
    DuplicateEmail,
    /// Unknown email address or wrong password.
    #[error("models: invalid credentials")]
    InvalidCredentials,
    #[error("models: password hashing failed: {0}")]
    PasswordHash(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
