#![forbid(unsafe_code)]

pub mod mirror;
pub mod repository;
pub mod sqlite;

pub use mirror::{FileMirror, InMemoryMirror, LocalMirror, MirrorError};
pub use repository::{InMemoryRepository, NewProgress, ProgressRepository, Storage, StorageError};
