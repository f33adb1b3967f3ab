use crate::models::{Event, NewEvent};
use crate::validator::{self, EMAIL_RX, Validator};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// --- Limits shared by the rules and their messages ---

pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;
pub const PASSWORD_MIN_CHARS: usize = 8;

const BLANK: &str = "This field cannot be blank";
const BAD_DATE: &str = "This field must be a valid date";
const BAD_EMAIL: &str = "This field must be a valid email address";

/// EventForm
///
/// Raw input of the create and edit event pages. Every field is kept as submitted so
/// that a failed submission re-renders exactly what the user typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventForm {
    pub title: String,
    pub description: String,
    pub location: String,
    /// `YYYY-MM-DD`, as produced by an `<input type="date">`.
    pub event_date: String,
}

impl EventForm {
    /// Pre-fills the form from a stored event (edit page).
    pub fn from_event(event: &Event) -> Self {
        Self {
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            event_date: event.event_date.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.event_date.trim(), "%Y-%m-%d").ok()
    }

    pub fn validate(&self) -> Validator {
        let mut v = Validator::new();
        v.check_field(validator::not_blank(&self.title), "title", BLANK);
        v.check_field(
            validator::max_chars(&self.title, TITLE_MAX_CHARS),
            "title",
            &format!("This field cannot be more than {TITLE_MAX_CHARS} characters long"),
        );
        v.check_field(
            validator::max_chars(&self.description, DESCRIPTION_MAX_CHARS),
            "description",
            &format!("This field cannot be more than {DESCRIPTION_MAX_CHARS} characters long"),
        );
        v.check_field(validator::not_blank(&self.location), "location", BLANK);
        v.check_field(self.parsed_date().is_some(), "event_date", BAD_DATE);
        v
    }

    /// Converts a validated form into the persistence payload.
    ///
    /// Returns `None` if the date does not parse; callers only reach this after
    /// `validate()` came back clean.
    pub fn to_new_event(&self) -> Option<NewEvent> {
        Some(NewEvent {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            location: self.location.trim().to_string(),
            event_date: self.parsed_date()?,
        })
    }
}

/// RegisterForm
///
/// The password is accepted from the request but never serialized back into a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::new();
        v.check_field(validator::not_blank(&self.name), "name", BLANK);
        v.check_field(validator::not_blank(&self.email), "email", BLANK);
        v.check_field(validator::matches(&self.email, &EMAIL_RX), "email", BAD_EMAIL);
        v.check_field(validator::not_blank(&self.password), "password", BLANK);
        v.check_field(
            validator::min_chars(&self.password, PASSWORD_MIN_CHARS),
            "password",
            &format!("This field must be at least {PASSWORD_MIN_CHARS} characters long"),
        );
        v
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::new();
        v.check_field(validator::not_blank(&self.email), "email", BLANK);
        v.check_field(validator::matches(&self.email, &EMAIL_RX), "email", BAD_EMAIL);
        v.check_field(validator::not_blank(&self.password), "password", BLANK);
        v
    }
}
