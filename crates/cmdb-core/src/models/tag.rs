//! Tag model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::ValidationErrors;

/// A reusable `(key, value)` label. The pair is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// The `key=value` form used by list filters and spreadsheets.
    pub fn label(&self) -> String {
        format!("{}={}", self.key, self.value)
    }
}

/// Payload for creating or renaming a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagInput {
    pub key: String,
    pub value: String,
}

impl TagInput {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Trims both halves and rejects blanks.
    pub fn normalized(&self) -> Result<TagInput, ValidationErrors> {
        let input = TagInput::new(self.key.trim(), self.value.trim());
        let mut errors = ValidationErrors::new();
        errors.require("key", Some(&input.key));
        errors.require("value", Some(&input.value));
        errors.into_result().map(|_| input)
    }
}
