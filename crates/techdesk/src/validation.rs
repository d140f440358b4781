//! Field-level validation errors shared by every write path.

use serde::Serialize;
use std::collections::BTreeMap;

pub const REQUIRED: &str = "this field is required";

/// A single rejected field and the message shown next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field error collected while validating one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("invalid input: {}", summarize(.errors))]
pub struct FieldErrors {
    errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| format!("{}: {}", error.field, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl FieldErrors {
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }

    pub fn by_field(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut grouped: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for error in &self.errors {
            grouped
                .entry(error.field)
                .or_default()
                .push(error.message.clone());
        }
        grouped
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Trims `value` and records an error if it is blank or longer than `max_chars`.
    pub fn require(&mut self, field: &'static str, value: &str, max_chars: usize) -> String {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.push(field, REQUIRED);
        } else {
            self.limit(field, trimmed, max_chars);
        }
        trimmed.to_string()
    }

    pub fn limit(&mut self, field: &'static str, value: &str, max_chars: usize) {
        let length = value.chars().count();
        if length > max_chars {
            self.push(
                field,
                format!("ensure this value has at most {max_chars} characters (it has {length})"),
            );
        }
    }
}
