use training_core::model::ProgressKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A user-facing message, e.g. a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
}

impl Notice {
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

/// Published by the tracker once a confirming call finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// The authoritative side accepted the optimistic count.
    Confirmed { key: ProgressKey, sets_completed: u32 },
    /// The week holding `key` was put back to its pre-update snapshot.
    RolledBack { key: ProgressKey },
    Notice(Notice),
}
