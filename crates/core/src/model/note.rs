use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::NoteId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NoteError {
    #[error("note text cannot be empty")]
    Empty,
}

/// Trimmed, non-empty note text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteText(String);

impl NoteText {
    /// # Errors
    ///
    /// Returns `NoteError::Empty` if nothing but whitespace was given.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, NoteError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(NoteError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

/// Free-text note embedded in a weekly progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyNote {
    pub note_id: NoteId,
    /// Creation time, or time of the last edit.
    pub date: DateTime<Utc>,
    pub note: String,
}

impl WeeklyNote {
    #[must_use]
    pub fn new(text: NoteText, now: DateTime<Utc>) -> Self {
        Self {
            note_id: NoteId::generate(),
            date: now,
            note: text.into_string(),
        }
    }

    pub fn rewrite(&mut self, text: NoteText, now: DateTime<Utc>) {
        self.note = text.into_string();
        self.date = now;
    }
}
