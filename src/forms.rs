//! Form values and their validation.
//!
//! Each form is a plain value decoded from the request body. Its `validate`
//! method returns a [`Validator`] holding the field-level and form-level errors,
//! and [`FormView`] pairs the submitted values with those errors so a page can
//! re-display the user's input next to the messages.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Permitted values for the snippet `expires` field, in days.
pub const PERMITTED_EXPIRY_DAYS: [u32; 3] = [1, 7, 365];

/// Default expiry pre-selected on the create form.
pub const DEFAULT_EXPIRY_DAYS: u32 = 365;

/// Maximum title length in characters.
pub const MAX_TITLE_CHARS: usize = 100;

/// Minimum password length in characters.
pub const MIN_PASSWORD_CHARS: usize = 8;

static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is a valid regex")
});

// =============================================================================
// Validator
// =============================================================================

/// Collected validation errors for one form submission.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Validator {
    pub field_errors: BTreeMap<String, String>,
    pub non_field_errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no errors were recorded.
    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    /// Record `message` for `key` unless the field already has an error.
    pub fn add_field_error(&mut self, key: &str, message: &str) {
        self.field_errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn add_non_field_error(&mut self, message: &str) {
        self.non_field_errors.push(message.to_string());
    }

    /// Record `message` for `key` when `ok` is false.
    pub fn check_field(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_field_error(key, message);
        }
    }

    pub fn field_error(&self, key: &str) -> Option<&str> {
        self.field_errors.get(key).map(String::as_str)
    }
}

pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// At most `n` characters (Unicode scalar values, not bytes).
pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

pub fn permitted<T: PartialEq>(value: &T, allowed: &[T]) -> bool {
    allowed.contains(value)
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

pub fn is_email(value: &str) -> bool {
    matches(value, &EMAIL_RX)
}

// =============================================================================
// Form echo
// =============================================================================

/// Submitted values plus their errors, as exposed to templates.
#[derive(Debug, Serialize)]
pub struct FormView<'a, T: Serialize> {
    #[serde(flatten)]
    pub values: &'a T,
    pub field_errors: &'a BTreeMap<String, String>,
    pub non_field_errors: &'a [String],
}

impl<'a, T: Serialize> FormView<'a, T> {
    pub fn new(values: &'a T, validator: &'a Validator) -> Self {
        Self {
            values,
            field_errors: &validator.field_errors,
            non_field_errors: &validator.non_field_errors,
        }
    }
}

// =============================================================================
// Forms
// =============================================================================

/// `POST /snippet/views`
///
/// `expires` stays textual so a non-numeric value becomes a field error instead
/// of a decoding failure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SnippetCreateForm {
    pub title: String,
    pub content: String,
    pub expires: String,
}

impl SnippetCreateForm {
    /// Empty form with the default expiry selected.
    pub fn blank() -> Self {
        Self {
            expires: DEFAULT_EXPIRY_DAYS.to_string(),
            ..Self::default()
        }
    }

    /// Parsed `expires`, if it is one of the permitted values.
    pub fn expires_days(&self) -> Option<u32> {
        self.expires
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|days| permitted(days, &PERMITTED_EXPIRY_DAYS))
    }

    pub fn validate(&self) -> Validator {
        let mut v = Validator::new();
        v.check_field(not_blank(&self.title), "title", "This field cannot be blank");
        v.check_field(
            max_chars(&self.title, MAX_TITLE_CHARS),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", "This field cannot be blank");
        v.check_field(
            self.expires_days().is_some(),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v
    }
}

/// `POST /user/signup`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl SignupForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::new();
        v.check_field(not_blank(&self.name), "name", "This field cannot be blank");
        v.check_field(not_blank(&self.email), "email", "This field cannot be blank");
        v.check_field(
            is_email(&self.email),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", "This field cannot be blank");
        v.check_field(
            min_chars(&self.password, MIN_PASSWORD_CHARS),
            "password",
            "This field must be at least 8 characters long",
        );
        v
    }
}

/// `POST /user/login`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Validator {
        let mut v = Validator::new();
        v.check_field(not_blank(&self.email), "email", "This field cannot be blank");
        v.check_field(
            is_email(&self.email),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", "This field cannot be blank");
        v
    }
}
