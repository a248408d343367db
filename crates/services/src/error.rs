//! Shared error types for the services crate.

use thiserror::Error;

use storage::mirror::MirrorError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use training_core::model::{NoteError, NoteId, ProgressError};

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    Note(#[from] NoteError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error("note {0} not found")]
    NoteNotFound(NoteId),
    #[error("plan duration must be at least one week")]
    InvalidDuration,
    #[error("plan has no exercises to initialize")]
    NoExercises,
    #[error("expected to initialize {expected} weekly records but inserted {inserted}")]
    InitializationMismatch { expected: u64, inserted: u64 },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by a `ProgressGateway` when the confirming call itself fails.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("invalid gateway url: {0}")]
    InvalidUrl(String),
    #[error("progress request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("progress request rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted by `ProgressTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    #[error("progress tracker needs a running tokio runtime")]
    NoRuntime,
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}
