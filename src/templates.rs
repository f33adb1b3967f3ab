//! Template cache.
//!
//! Every page under `ui/html/pages/` is compiled once at startup together with the
//! shared base layout and partials. The resulting cache is read-only, so any number of
//! requests can render from it concurrently without locking.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use minijinja::Environment;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::{error::AppError, forms, models::Event, validator::Validator};

/// The `ui/html/` tree compiled into the binary.
#[derive(RustEmbed)]
#[folder = "ui/html/"]
struct TemplateFiles;

const PAGES_ROOT: &str = "pages/";
const TEMPLATE_EXT: &str = ".html";

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template {0} not found")]
    NotFound(String),
    #[error("parsing template {name}: {source}")]
    Compile {
        name: String,
        #[source]
        source: minijinja::Error,
    },
    #[error("executing template: {0}")]
    Render(#[from] minijinja::Error),
    #[error("embedded asset {0} is not valid UTF-8")]
    MissingAsset(String),
}

/// TemplateCache
///
/// A compiled environment plus the closed set of page names that may be rendered.
/// Partials and the base layout are compiled into the same environment but are not
/// addressable as pages.
#[derive(Debug)]
pub struct TemplateCache {
    env: Environment<'static>,
    pages: BTreeSet<String>,
}

impl TemplateCache {
    /// new
    ///
    /// Builds the cache from the templates embedded in the binary. Any compile error is
    /// returned so startup can abort before the server ever binds.
    pub fn new() -> Result<Self, TemplateError> {
        let mut sources = Vec::new();
        for path in TemplateFiles::iter().filter(|p| p.ends_with(TEMPLATE_EXT)) {
            let file = TemplateFiles::get(&path)
                .ok_or_else(|| TemplateError::MissingAsset(path.to_string()))?;
            let source = String::from_utf8(file.data.into_owned())
                .map_err(|_| TemplateError::MissingAsset(path.to_string()))?;
            sources.push((path.to_string(), source));
        }
        Self::from_sources(sources)
    }

    /// from_sources
    ///
    /// Compiles `(path, source)` pairs laid out like the `ui/html/` tree: paths under
    /// `pages/` become pages named relative to that directory (e.g.
    /// `events/create.html`); everything else is shared and keeps its path (e.g.
    /// `base.html`, `partials/nav.html`).
    pub fn from_sources<I>(sources: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env = Environment::new();
        env.add_filter("human_date", human_date);

        let mut pages = BTreeSet::new();
        for (path, source) in sources {
            let name = match path.strip_prefix(PAGES_ROOT) {
                Some(page) => {
                    pages.insert(page.to_string());
                    page.to_string()
                }
                None => path,
            };

            env.add_template_owned(name.clone(), source)
                .map_err(|source| TemplateError::Compile {
                    name: name.clone(),
                    source,
                })?;
            tracing::debug!(template = %name, "cached template");
        }

        Ok(Self { env, pages })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pages.contains(name)
    }

    pub fn pages(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(String::as_str)
    }

    /// render
    ///
    /// Executes the page into an in-memory string. Nothing is written to the client
    /// until execution has fully succeeded.
    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, TemplateError> {
        if !self.pages.contains(name) {
            return Err(TemplateError::NotFound(name.to_string()));
        }
        let template = self.env.get_template(name)?;
        Ok(template.render(data)?)
    }

    /// render_response
    ///
    /// Renders `name` and, only on success, pairs the buffered body with `status`.
    pub fn render_response<T: Serialize>(
        &self,
        name: &str,
        data: &T,
        status: StatusCode,
    ) -> Result<Response, AppError> {
        let body = self.render(name, data)?;
        Ok((status, Html(body)).into_response())
    }
}

const HUMAN_DATE_FORMAT: &str = "%Y-%m-%d";

/// human_date
///
/// Renders `YYYY-MM-DD` dates and RFC 3339 timestamps as the UTC calendar date
/// (`2006-01-02`). Anything else (including the empty string) renders as nothing.
pub fn human_date(value: String) -> String {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, HUMAN_DATE_FORMAT) {
        return date.format(HUMAN_DATE_FORMAT).to_string();
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return ts.with_timezone(&Utc).format(HUMAN_DATE_FORMAT).to_string();
    }
    String::new()
}

/// TemplateData
///
/// Everything a page may read. Built per request from the request-scoped context and
/// then filled in by the handler.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateData {
    pub title: String,
    pub current_year: i32,
    pub csrf_token: String,
    pub is_authenticated: bool,
    pub flash: Option<String>,
    pub form: Option<minijinja::Value>,
    pub errors: Validator,
    pub event: Option<Event>,
    pub events: Vec<Event>,
    pub limits: FormLimits,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FormLimits {
    pub title_max: usize,
    pub description_max: usize,
    pub password_min: usize,
}

impl Default for TemplateData {
    fn default() -> Self {
        Self {
            title: "Event Planner".to_string(),
            current_year: Utc::now().year(),
            csrf_token: String::new(),
            is_authenticated: false,
            flash: None,
            form: None,
            errors: Validator::default(),
            event: None,
            events: Vec::new(),
            limits: FormLimits {
                title_max: forms::TITLE_MAX_CHARS,
                description_max: forms::DESCRIPTION_MAX_CHARS,
                password_min: forms::PASSWORD_MIN_CHARS,
            },
        }
    }
}

impl TemplateData {
    pub fn with_form<F: Serialize>(mut self, form: &F) -> Self {
        self.form = Some(minijinja::Value::from_serialize(form));
        self
    }

    pub fn with_errors(mut self, errors: Validator) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.event = Some(event);
        self
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }
}
