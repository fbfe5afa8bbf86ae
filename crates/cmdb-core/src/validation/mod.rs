//! Field-level input validation for CMDB records.
//!
//! Every store validates its input before touching the database and reports
//! problems as a [`ValidationErrors`] list, one [`FieldError`] per offending
//! field, so callers can attach messages to individual form inputs.
//!
//! # Available Checks
//!
//! - [`validate_ipv4`] - dotted-quad IPv4 addresses
//! - [`validate_port`] - TCP/UDP ports in `1..=65535`
//! - [`normalize_optional`] - blank strings collapse to `None`

mod network;

pub use network::{validate_ipv4, validate_port, NetworkValidationError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single invalid field and the reason it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending field, using the wire name (e.g. `public_ipv4`).
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

/// An accumulated list of field errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an error list holding exactly one field error.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Records an error when `value` is missing or blank.
    pub fn require(&mut self, field: &str, value: Option<&str>) {
        if value.map(str::trim).unwrap_or_default().is_empty() {
            self.add(field, format!("{} is required", field));
        }
    }

    /// Validates an optional IPv4 field, recording an error for malformed input.
    pub fn check_ipv4(&mut self, field: &str, value: Option<&str>) {
        if let Some(ip) = value {
            if let Err(e) = validate_ipv4(ip) {
                self.add(field, e.to_string());
            }
        }
    }

    /// Validates an optional port field, recording an error when out of range.
    pub fn check_port(&mut self, field: &str, value: Option<i64>) {
        if let Some(port) = value {
            if let Err(e) = validate_port(port) {
                self.add(field, e.to_string());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns the first error message recorded for `field`.
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    /// Converts the accumulated list into a `Result`.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Joins all messages into one line, prefixed by field name.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

impl std::error::Error for ValidationErrors {}

/// Trims a string field, mapping blank values to `None`.
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
