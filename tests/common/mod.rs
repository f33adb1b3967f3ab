#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::{NaiveDate, Utc};
use event_planner::{
    AppConfig, AppState, create_router,
    models::{Event, ModelError, NewEvent},
    repository::{EventRepository, EventStore, UserRepository, UserStore},
    templates::TemplateCache,
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tower::ServiceExt;
use tower_sessions::MemoryStore;

// --- Mock Repositories ---

/// In-memory event store. Ids start at 1 and are never reused.
#[derive(Default)]
pub struct MockEventRepo {
    pub events: Mutex<Vec<Event>>,
    next_id: AtomicUsize,
}

impl MockEventRepo {
    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn get(&self, id: i64) -> Option<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }
}

#[async_trait]
impl EventRepository for MockEventRepo {
    async fn create(&self, event: NewEvent) -> Result<i64, ModelError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        let now = Utc::now();
        self.events.lock().unwrap().push(Event {
            id,
            title: event.title,
            description: event.description,
            location: event.location,
            event_date: event.event_date,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn retrieve(&self, id: i64) -> Result<Event, ModelError> {
        self.get(id).ok_or(ModelError::NoRecord)
    }

    async fn list(&self) -> Result<Vec<Event>, ModelError> {
        Ok(self.events.lock().unwrap().clone())
    }

    async fn update(&self, id: i64, event: NewEvent) -> Result<(), ModelError> {
        let mut events = self.events.lock().unwrap();
        let stored = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(ModelError::NoRecord)?;
        stored.title = event.title;
        stored.description = event.description;
        stored.location = event.location;
        stored.event_date = event.event_date;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), ModelError> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| e.id != id);
        if events.len() == before {
            return Err(ModelError::NoRecord);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
}

/// In-memory user store with plaintext passwords and switches for failure paths.
#[derive(Default)]
pub struct MockUserRepo {
    pub users: Mutex<Vec<MockUser>>,
    /// When set, `exists` fails as if the database were unreachable.
    pub exists_fails: AtomicBool,
    pub exists_calls: AtomicUsize,
}

impl MockUserRepo {
    pub fn with_user(id: i64, email: &str, password: &str) -> Self {
        let repo = Self::default();
        repo.users.lock().unwrap().push(MockUser {
            id,
            name: "Test User".to_string(),
            email: email.to_string(),
            password: password.to_string(),
        });
        repo
    }

    pub fn remove(&self, id: i64) -> Option<MockUser> {
        let mut users = self.users.lock().unwrap();
        let index = users.iter().position(|u| u.id == id)?;
        Some(users.remove(index))
    }

    pub fn restore(&self, user: MockUser) {
        self.users.lock().unwrap().push(user);
    }

    pub fn count(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl UserRepository for MockUserRepo {
    async fn create(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == email) {
            return Err(ModelError::DuplicateEmail);
        }
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        users.push(MockUser {
            id,
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        });
        Ok(())
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email && u.password == password)
            .map(|u| u.id)
            .ok_or(ModelError::InvalidCredentials)
    }

    async fn exists(&self, id: i64) -> Result<bool, ModelError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if self.exists_fails.load(Ordering::SeqCst) {
            return Err(ModelError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.users.lock().unwrap().iter().any(|u| u.id == id))
    }
}

// --- App Setup ---

pub const TEST_EMAIL: &str = "alice@example.com";
pub const TEST_PASSWORD: &str = "correct-horse";
pub const TEST_USER_ID: i64 = 1;

pub struct TestApp {
    pub router: Router,
    pub events: Arc<MockEventRepo>,
    pub users: Arc<MockUserRepo>,
}

pub fn test_state(events: EventStore, users: UserStore, config: AppConfig) -> AppState {
    AppState {
        events,
        users,
        templates: Arc::new(TemplateCache::new().expect("embedded templates compile")),
        config,
    }
}

/// The full application over mock repositories and an in-memory session store.
pub fn spawn_app_with_config(config: AppConfig) -> TestApp {
    let events = Arc::new(MockEventRepo::default());
    let users = Arc::new(MockUserRepo::with_user(TEST_USER_ID, TEST_EMAIL, TEST_PASSWORD));
    let state = test_state(events.clone(), users.clone(), config);
    TestApp {
        router: create_router(state, MemoryStore::default()),
        events,
        users,
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_config(AppConfig::default())
}

/// A fresh in-memory SQLite database with the migrations applied. A single connection
/// that never expires keeps the database alive for the whole test.
pub async fn sqlite_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations apply");
    pool
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

// --- Test Client ---

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The raw `Set-Cookie` line for the session cookie, if one was issued.
    pub fn session_set_cookie(&self) -> Option<&str> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("session="))
    }

    /// Pulls the CSRF token out of the first hidden `csrf_token` input on the page.
    pub fn csrf_token(&self) -> Option<String> {
        let marker = r#"name="csrf_token" value=""#;
        let start = self.body.find(marker)? + marker.len();
        let end = self.body[start..].find('"')? + start;
        Some(self.body[start..end].to_string())
    }
}

/// Sends requests through the router like a browser would: it remembers the session
/// cookie the server hands out and replays it on the next request.
pub struct TestClient {
    router: Router,
    pub cookie: Option<String>,
}

impl TestClient {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            cookie: None,
        }
    }

    pub async fn send(&mut self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let response = TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        };

        if let Some(set_cookie) = response.session_set_cookie() {
            let pair = set_cookie.split(';').next().unwrap_or_default();
            let removed = pair == "session=" || set_cookie.contains("Max-Age=0");
            self.cookie = if removed { None } else { Some(pair.to_string()) };
        }
        response
    }

    fn request(&self, method: &str, uri: &str) -> axum::http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        let request = self.request("GET", uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = serde_urlencoded::to_string(fields).unwrap();
        let request = self
            .request("POST", uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Loads `page` to obtain a CSRF token, then posts `fields` plus that token to `uri`.
    pub async fn submit(&mut self, page: &str, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let token = self
            .get(page)
            .await
            .csrf_token()
            .expect("page carries a csrf token");
        let mut fields = fields.to_vec();
        fields.push(("csrf_token", &token));
        self.post_form(uri, &fields).await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        self.submit("/login", "/login", &[("email", email), ("password", password)])
            .await
    }
}
