mod common;

use axum::http::{StatusCode, header};
use common::{TEST_EMAIL, TEST_PASSWORD, TEST_USER_ID, TestClient, spawn_app};
use std::sync::atomic::Ordering;

// --- Anonymous → Authenticated ---

#[tokio::test]
async fn test_login_rotates_token_and_redirects_home() {
    let app = spawn_app();
    let mut client = TestClient::new(app.router);

    client.get("/login").await;
    let pre_login = client.cookie.clone().expect("anonymous session issued");

    let res = client.login(TEST_EMAIL, TEST_PASSWORD).await;

    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/"));
    let post_login = client.cookie.clone().expect("session cookie re-issued");
    assert_ne!(pre_login, post_login);

    // The new token is authenticated...
    let res = client.get("/events/create").await;
    assert_eq!(res.status, StatusCode::OK);

    // ...the fixated pre-login token is not.
    client.cookie = Some(pre_login);
    let res = client.get("/events/create").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/login"));
}

#[tokio::test]
async fn test_login_with_bad_credentials_is_a_form_error() {
    let app = spawn_app();
    let mut client = TestClient::new(app.router);

    let res = client.login(TEST_EMAIL, "wrong password").await;

    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.body.contains("Email or password is incorrect"));
    // The submitted email is kept, the password is not echoed back.
    assert!(res.body.contains(TEST_EMAIL));
    assert!(!res.body.contains("wrong password"));

    let res = client.get("/events/create").await;
    assert_eq!(res.location(), Some("/login"));
}

#[tokio::test]
async fn test_login_with_blank_fields_shows_field_errors() {
    let mut client = TestClient::new(spawn_app().router);

    let res = client.login("", "").await;

    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.body.contains("This field cannot be blank"));
}

// --- Authenticated → Anonymous ---

#[tokio::test]
async fn test_logout_rotates_token_and_old_token_is_dead() {
    let app = spawn_app();
    let mut client = TestClient::new(app.router);
    client.login(TEST_EMAIL, TEST_PASSWORD).await;
    let logged_in = client.cookie.clone().unwrap();

    let res = client.submit("/", "/logout", &[]).await;

    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/"));
    let logged_out = client.cookie.clone().unwrap();
    assert_ne!(logged_in, logged_out);

    // The session after logout is anonymous and shows the flash once.
    let res = client.get("/").await;
    assert!(res.body.contains("logged out successfully"));
    assert!(res.body.contains(r#"href="/login""#));
    let res = client.get("/").await;
    assert!(!res.body.contains("logged out successfully"));

    // Replaying the token from before logout no longer authenticates.
    client.cookie = Some(logged_in);
    let res = client.get("/events/create").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/login"));
}

#[tokio::test]
async fn test_login_logout_then_reuse_pre_login_token() {
    let mut client = TestClient::new(spawn_app().router);
    client.get("/login").await;
    let pre_login = client.cookie.clone().unwrap();

    client.login(TEST_EMAIL, TEST_PASSWORD).await;
    client.submit("/", "/logout", &[]).await;

    client.cookie = Some(pre_login);
    let res = client.get("/events/create").await;
    assert_eq!(res.location(), Some("/login"));
}

// --- Lazy re-validation ---

#[tokio::test]
async fn test_deleted_user_is_anonymous_on_next_request() {
    let app = spawn_app();
    let users = app.users.clone();
    let mut client = TestClient::new(app.router);
    client.login(TEST_EMAIL, TEST_PASSWORD).await;
    assert_eq!(client.get("/events/create").await.status, StatusCode::OK);

    let removed = users.remove(TEST_USER_ID).unwrap();

    let res = client.get("/events/create").await;
    assert_eq!(res.status, StatusCode::SEE_OTHER);
    assert_eq!(res.location(), Some("/login"));
    let res = client.get("/").await;
    assert!(res.body.contains(r#"href="/login""#));

    // The stale id was left in the session: once the account is back, so is access.
    users.restore(removed);
    let res = client.get("/events/create").await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn test_anonymous_requests_skip_the_user_lookup() {
    let app = spawn_app();
    let users = app.users.clone();
    let mut client = TestClient::new(app.router);

    client.get("/").await;
    client.get("/events").await;
    client.get("/events/create").await;

    assert_eq!(users.exists_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_user_lookup_runs_on_every_authenticated_request() {
    let app = spawn_app();
    let users = app.users.clone();
    let mut client = TestClient::new(app.router);
    client.login(TEST_EMAIL, TEST_PASSWORD).await;
    let before = users.exists_calls.load(Ordering::SeqCst);

    client.get("/").await;
    client.get("/events").await;

    assert_eq!(users.exists_calls.load(Ordering::SeqCst), before + 2);
}

#[tokio::test]
async fn test_user_store_failure_is_500() {
    let app = spawn_app();
    let users = app.users.clone();
    let mut client = TestClient::new(app.router);
    client.login(TEST_EMAIL, TEST_PASSWORD).await;

    users.exists_fails.store(true, Ordering::SeqCst);
    let res = client.get("/events").await;

    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body, "Internal Server Error");
}

// --- Gates ---

#[tokio::test]
async fn test_protected_pages_redirect_anonymous_visitors() {
    let mut client = TestClient::new(spawn_app().router);

    for uri in ["/events/create", "/events/1/edit"] {
        let res = client.get(uri).await;
        assert_eq!(res.status, StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(res.location(), Some("/login"), "{uri}");
    }
}

#[tokio::test]
async fn test_protected_responses_are_not_cached() {
    let mut client = TestClient::new(spawn_app().router);
    client.login(TEST_EMAIL, TEST_PASSWORD).await;

    let res = client.get("/events/create").await;
    assert_eq!(res.header(header::CACHE_CONTROL), Some("no-store"));

    let res = client.get("/events").await;
    assert_eq!(res.header(header::CACHE_CONTROL), None);
}

#[tokio::test]
async fn test_guest_pages_redirect_authenticated_visitors() {
    let mut client = TestClient::new(spawn_app().router);
    client.login(TEST_EMAIL, TEST_PASSWORD).await;

    for uri in ["/login", "/register"] {
        let res = client.get(uri).await;
        assert_eq!(res.status, StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(res.location(), Some("/events"), "{uri}");
    }
}
