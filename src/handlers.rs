use crate::{
    AppState,
    auth::{self, AuthState},
    csrf::CsrfToken,
    error::AppError,
    forms::{EventForm, LoginForm, RegisterForm},
    models::ModelError,
    session,
    templates::TemplateData,
};
use axum::{
    Form,
    extract::{FromRequestParts, Path, State, rejection::FormRejection},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use rust_embed::RustEmbed;
use std::convert::Infallible;
use tower_sessions::Session;

// --- Request-scoped page context ---

/// PageContext
///
/// Collects what the middleware stages resolved for this request (CSRF token,
/// authentication state, session handle) so a handler can turn it into
/// `TemplateData`. Nothing here is shared between requests.
pub struct PageContext {
    csrf_token: CsrfToken,
    auth: AuthState,
    session: Option<Session>,
}

impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let csrf_token = CsrfToken::from_request_parts(parts, state).await?;
        let auth = AuthState::from_request_parts(parts, state).await?;
        let session = parts.extensions.get::<Session>().cloned();
        Ok(Self {
            csrf_token,
            auth,
            session,
        })
    }
}

impl PageContext {
    /// template_data
    ///
    /// Base data for a page. The pending flash message is consumed here, so it is shown
    /// exactly once: on the next page that actually renders.
    pub async fn template_data(&self) -> TemplateData {
        let flash = match &self.session {
            Some(session) => session::pop_flash(session).await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "could not read flash message");
                None
            }),
            None => None,
        };

        TemplateData {
            csrf_token: self.csrf_token.0.clone(),
            is_authenticated: self.auth.is_authenticated(),
            flash,
            ..TemplateData::default()
        }
    }
}

/// Path ids must be positive integers; anything else is answered with 404.
fn parse_id(raw: &str) -> Result<i64, AppError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::client(
            StatusCode::NOT_FOUND,
            format!("invalid id in path: {raw:?}"),
        )),
    }
}

/// Unwraps a form body, turning a malformed one into a plain 400.
fn form_input<T>(form: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    form.map(|Form(input)| input)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

async fn flash(session: &Session, message: &str) -> Result<(), AppError> {
    session::put_flash(session, message)
        .await
        .map_err(AppError::server)
}

// --- Public pages ---

/// ping
///
/// Liveness probe. Runs outside the session chain.
pub async fn ping() -> &'static str {
    "pong"
}

pub async fn home(State(state): State<AppState>, ctx: PageContext) -> Result<Response, AppError> {
    let events = state.events.list().await?;
    let data = ctx.template_data().await.with_events(events);
    state.templates.render_response("home.html", &data, StatusCode::OK)
}

pub async fn event_list(
    State(state): State<AppState>,
    ctx: PageContext,
) -> Result<Response, AppError> {
    let events = state.events.list().await?;
    let data = ctx.template_data().await.with_events(events);
    state
        .templates
        .render_response("events/list.html", &data, StatusCode::OK)
}

/// event_detail
///
/// Unknown ids (`ModelError::NoRecord`) become a 404 via the `From<ModelError>` mapping.
pub async fn event_detail(
    State(state): State<AppState>,
    ctx: PageContext,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let event = state.events.retrieve(id).await?;
    let data = ctx.template_data().await.with_event(event);
    state
        .templates
        .render_response("events/detail.html", &data, StatusCode::OK)
}

// --- Protected event pages ---

pub async fn event_create_form(
    State(state): State<AppState>,
    ctx: PageContext,
) -> Result<Response, AppError> {
    let data = ctx.template_data().await.with_form(&EventForm::default());
    state
        .templates
        .render_response("events/create.html", &data, StatusCode::OK)
}

/// event_create
///
/// Invalid input re-renders the create page with 422 and nothing is inserted.
pub async fn event_create(
    State(state): State<AppState>,
    session: Session,
    ctx: PageContext,
    form: Result<Form<EventForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = form_input(form)?;
    let errors = form.validate();

    let new_event = match form.to_new_event() {
        Some(event) if errors.valid() => event,
        _ => {
            let data = ctx.template_data().await.with_form(&form).with_errors(errors);
            return state.templates.render_response(
                "events/create.html",
                &data,
                StatusCode::UNPROCESSABLE_ENTITY,
            );
        }
    };

    let id = state.events.create(new_event).await?;
    tracing::info!(event_id = id, "event created");
    flash(&session, "Event successfully created!").await?;

    Ok(Redirect::to(&format!("/events/detail/{id}")).into_response())
}

pub async fn event_edit_form(
    State(state): State<AppState>,
    ctx: PageContext,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let event = state.events.retrieve(id).await?;
    let data = ctx
        .template_data()
        .await
        .with_form(&EventForm::from_event(&event))
        .with_event(event);
    state
        .templates
        .render_response("events/edit.html", &data, StatusCode::OK)
}

pub async fn event_update(
    State(state): State<AppState>,
    session: Session,
    ctx: PageContext,
    Path(id): Path<String>,
    form: Result<Form<EventForm>, FormRejection>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let form = form_input(form)?;
    let errors = form.validate();

    let changes = match form.to_new_event() {
        Some(event) if errors.valid() => event,
        _ => {
            // The edit page needs the stored event for its heading and form action.
            let event = state.events.retrieve(id).await?;
            let data = ctx
                .template_data()
                .await
                .with_form(&form)
                .with_errors(errors)
                .with_event(event);
            return state.templates.render_response(
                "events/edit.html",
                &data,
                StatusCode::UNPROCESSABLE_ENTITY,
            );
        }
    };

    state.events.update(id, changes).await?;
    tracing::info!(event_id = id, "event updated");
    flash(&session, "Event successfully updated!").await?;

    Ok(Redirect::to(&format!("/events/detail/{id}")).into_response())
}

pub async fn event_delete(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    state.events.delete(id).await?;
    tracing::info!(event_id = id, "event deleted");
    flash(&session, "Event successfully deleted!").await?;

    Ok(Redirect::to("/events").into_response())
}

// --- Accounts ---

pub async fn register_form(
    State(state): State<AppState>,
    ctx: PageContext,
) -> Result<Response, AppError> {
    let data = ctx.template_data().await.with_form(&RegisterForm::default());
    state
        .templates
        .render_response("user/register.html", &data, StatusCode::OK)
}

/// register
///
/// A duplicate email is a form error on the `email` field (422), not a server fault.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    ctx: PageContext,
    form: Result<Form<RegisterForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = form_input(form)?;
    let mut errors = form.validate();

    if errors.valid() {
        match state
            .users
            .create(form.name.trim(), form.email.trim(), &form.password)
            .await
        {
            Ok(()) => {
                flash(&session, "Your signup was successful. Please log in.").await?;
                return Ok(Redirect::to(auth::LOGIN_PATH).into_response());
            }
            Err(ModelError::DuplicateEmail) => {
                errors.add_field_error("email", "This email address is already registered.");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let data = ctx.template_data().await.with_form(&form).with_errors(errors);
    state.templates.render_response(
        "user/register.html",
        &data,
        StatusCode::UNPROCESSABLE_ENTITY,
    )
}

pub async fn login_form(
    State(state): State<AppState>,
    ctx: PageContext,
) -> Result<Response, AppError> {
    let data = ctx.template_data().await.with_form(&LoginForm::default());
    state
        .templates
        .render_response("user/login.html", &data, StatusCode::OK)
}

/// login
///
/// On success the session token is rotated before the user id is stored, then the
/// visitor is sent home. Bad credentials are a whole-form error (422).
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ctx: PageContext,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, AppError> {
    let form = form_input(form)?;
    let mut errors = form.validate();

    if errors.valid() {
        match state
            .users
            .authenticate(form.email.trim(), &form.password)
            .await
        {
            Ok(user_id) => {
                auth::login(&session, user_id, state.config.session_lifetime)
                    .await
                    .map_err(AppError::server)?;
                tracing::info!(user_id, "user logged in");
                return Ok(Redirect::to("/").into_response());
            }
            Err(ModelError::InvalidCredentials) => {
                errors.add_non_field_error("Email or password is incorrect");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let data = ctx.template_data().await.with_form(&form).with_errors(errors);
    state.templates.render_response(
        "user/login.html",
        &data,
        StatusCode::UNPROCESSABLE_ENTITY,
    )
}

pub async fn logout(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    auth::logout(&session, state.config.session_lifetime)
        .await
        .map_err(AppError::server)?;
    flash(&session, "You've been logged out successfully!").await?;

    Ok(Redirect::to("/").into_response())
}

// --- Static assets ---

/// The `ui/static/` tree compiled into the binary.
#[derive(RustEmbed)]
#[folder = "ui/static/"]
struct StaticFiles;

/// serve_static
///
/// Serves files embedded from `ui/static/`. Paths with `..` segments are refused
/// outright.
pub async fn serve_static(Path(path): Path<String>) -> Response {
    if path.split('/').any(|segment| segment == "..") {
        return AppError::NotFound.into_response();
    }
    match StaticFiles::get(&path) {
        Some(file) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.to_string())], file.data).into_response()
        }
        None => AppError::NotFound.into_response(),
    }
}

/// Fallback for paths no route matches.
pub async fn not_found() -> AppError {
    AppError::NotFound
}
