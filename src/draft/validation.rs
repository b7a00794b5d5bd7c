//! Required-field checks for drafts.
//!
//! Problems are collected, never thrown: the draft stays untouched and the
//! caller decides how to show them.

use std::fmt;

use super::DraftField;
use crate::notification::Notification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    Missing,
    InvalidDate,
    NoImages,
}

/// One failed check, pointing at the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub problem: Problem,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: &'static str, problem: Problem, message: impl Into<String>) -> Self {
        Self {
            field,
            problem,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn empty_field(field: DraftField) -> Self {
        Self::new(
            field.as_str(),
            Problem::Missing,
            format!("{} is required", field.label()),
        )
    }

    pub fn invalid_date(value: &str) -> Self {
        Self::new(
            DraftField::Date.as_str(),
            Problem::InvalidDate,
            format!("'{}' is not a valid date", value),
        )
        .with_suggestion("Use YYYY-MM-DD, for example 2024-05-01")
    }

    pub fn no_images() -> Self {
        Self::new("images", Problem::NoImages, "At least one image is required")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Outcome of `validate`: empty means the draft may be submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    /// Names of the offending fields, in check order.
    pub fn fields(&self) -> Vec<&'static str> {
        self.errors.iter().map(|e| e.field).collect()
    }

    pub fn has(&self, problem: Problem) -> bool {
        self.errors.iter().any(|e| e.problem == problem)
    }

    pub fn to_notification(&self) -> Notification {
        let details = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Notification::error(format!("Please fill all required fields: {}", details))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
