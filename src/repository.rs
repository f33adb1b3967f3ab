use crate::models::{Event, ModelError, NewEvent};
use crate::password;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

/// EventRepository Trait
///
/// Defines the abstract contract for event persistence. Handlers only ever see this
/// trait, so the SQLite implementation can be swapped for an in-memory mock in tests.
///
/// **Send + Sync + async_trait** are required to make the trait object (`Arc<dyn EventRepository>`)
/// shareable across Axum's asynchronous task boundaries.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Inserts a new event and returns its id.
    async fn create(&self, event: NewEvent) -> Result<i64, ModelError>;
    /// Fetches a single event. Returns `ModelError::NoRecord` when the id is unknown.
    async fn retrieve(&self, id: i64) -> Result<Event, ModelError>;
    async fn list(&self) -> Result<Vec<Event>, ModelError>;
    /// Overwrites the writable fields. Returns `ModelError::NoRecord` when no row matched.
    async fn update(&self, id: i64, event: NewEvent) -> Result<(), ModelError>;
    /// Removes an event. Deleting a missing row is an error (`ModelError::NoRecord`).
    async fn delete(&self, id: i64) -> Result<(), ModelError>;
}

/// UserRepository Trait
///
/// Defines the account operations needed by registration, login and the per-request
/// authentication check.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Registers a user. Returns `ModelError::DuplicateEmail` if the email is taken.
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError>;
    /// Verifies credentials and returns the user id, or `ModelError::InvalidCredentials`.
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError>;
    /// Answers whether a user with this id is still present in the store.
    async fn exists(&self, id: i64) -> Result<bool, ModelError>;
}

/// EventStore / UserStore
///
/// The concrete types used to share the persistence layer across the application state.
pub type EventStore = Arc<dyn EventRepository>;
pub type UserStore = Arc<dyn UserRepository>;

const EVENT_COLUMNS: &str =
    "id, title, description, location, event_date, created_at, updated_at";

/// SqliteEventRepository
///
/// The concrete implementation of `EventRepository`, backed by SQLite.
#[derive(Clone)]
pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn create(&self, event: NewEvent) -> Result<i64, ModelError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO events (title, description, event_date, location, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.event_date)
        .bind(&event.location)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn retrieve(&self, id: i64) -> Result<Event, ModelError> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?");
        sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ModelError::NoRecord)
    }

    /// list
    ///
    /// Returns every event, soonest first. Ties on the same day keep insertion order.
    async fn list(&self) -> Result<Vec<Event>, ModelError> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY event_date ASC, id ASC");
        Ok(sqlx::query_as::<_, Event>(&query)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update(&self, id: i64, event: NewEvent) -> Result<(), ModelError> {
        let result = sqlx::query(
            r#"UPDATE events
               SET title = ?, description = ?, event_date = ?, location = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.event_date)
        .bind(&event.location)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ModelError::NoRecord);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), ModelError> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ModelError::NoRecord);
        }
        Ok(())
    }
}

/// SqliteUserRepository
///
/// The concrete implementation of `UserRepository`. Password hashing and verification
/// are CPU-bound, so they run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    /// create
    ///
    /// Hashes the password and inserts the account. The unique index on `email`
    /// is the source of truth for duplicates, so concurrent registrations cannot both win.
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError> {
        let plaintext = password.to_owned();
        let hashed = tokio::task::spawn_blocking(move || password::hash_password(&plaintext))
            .await
            .map_err(|e| ModelError::PasswordHash(e.to_string()))?
            .map_err(ModelError::PasswordHash)?;

        let result = sqlx::query(
            "INSERT INTO users (name, email, hashed_password, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(email)
        .bind(hashed)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(ModelError::DuplicateEmail)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// authenticate
    ///
    /// An unknown email and a wrong password produce the same error, so the login form
    /// cannot be used to probe which addresses are registered.
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, hashed_password FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, hashed)) = row else {
            return Err(ModelError::InvalidCredentials);
        };

        let plaintext = password.to_owned();
        let matches =
            tokio::task::spawn_blocking(move || password::verify_password(&plaintext, &hashed))
                .await
                .map_err(|e| ModelError::PasswordHash(e.to_string()))?
                .map_err(ModelError::PasswordHash)?;

        if !matches {
            return Err(ModelError::InvalidCredentials);
        }
        Ok(id)
    }

    async fn exists(&self, id: i64) -> Result<bool, ModelError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}
