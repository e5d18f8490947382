use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::RepoError;

/// Key under which messages not tied to a single field are collected.
pub const NON_FIELD_ERRORS: &str = "__all__";

pub const REQUIRED: &str = "This field is required.";
pub const NULL_CHARACTERS: &str = "Null characters are not allowed.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

/// FieldErrors
///
/// Validation messages keyed by form field name. Serializes as a plain
/// `{ "field": ["message", ...] }` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.add(NON_FIELD_ERRORS, message);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields carrying at least one message.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Messages for `field`, empty when the field passed.
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    /// Ok when no message was recorded, otherwise the collected errors.
    pub fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError::Invalid(self))
        }
    }
}

/// ValidationError
///
/// Outcome of a failed validator run: either the input is wrong, or a lookup
/// needed to judge it (e.g. "does this course exist") failed in storage.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("submitted values are invalid")]
    Invalid(FieldErrors),
    #[error(transparent)]
    Storage(#[from] RepoError),
}

// --- Field Rules ---

pub fn trim(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn max_length(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    let length = value.chars().count();
    if length > max {
        errors.add(
            field,
            format!(
                "Ensure this value has at most {} characters (it has {}).",
                max, length
            ),
        );
    }
}

// PostgreSQL text columns cannot hold U+0000.
fn no_null_characters(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.contains('\0') {
        errors.add(field, NULL_CHARACTERS);
    }
}

/// A non-blank string of at most `max` characters.
pub fn required_text(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    if value.is_empty() {
        errors.add(field, REQUIRED);
    } else {
        optional_text(errors, field, value, max);
    }
}

/// A possibly blank string of at most `max` characters, without NUL characters.
pub fn optional_text(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    max_length(errors, field, value, max);
    no_null_characters(errors, field, value);
}

/// Records a "required" message when `value` is missing.
pub fn required<T: Copy>(errors: &mut FieldErrors, field: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        errors.add(field, REQUIRED);
    }
    value
}

pub fn in_range(errors: &mut FieldErrors, field: &str, value: i32, min: i32, max: i32) {
    if value < min {
        errors.add(
            field,
            format!("Ensure this value is greater than or equal to {}.", min),
        );
    } else if value > max {
        errors.add(
            field,
            format!("Ensure this value is less than or equal to {}.", max),
        );
    }
}

/// Records an invalid-choice message unless the referenced record exists.
pub fn existing(errors: &mut FieldErrors, field: &str, found: bool) {
    if !found {
        errors.add(field, INVALID_CHOICE);
    }
}

/// "Course with this Course number and Course name already exists."
pub fn unique_message(entity: &str, fields: &[&str]) -> String {
    let joined = match fields {
        [] => String::new(),
        [only] => only.to_string(),
        [head @ .., last] => format!("{} and {}", head.join(", "), last),
    };
    format!("{} with this {} already exists.", entity, joined)
}
