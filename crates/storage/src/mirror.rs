//! Local key-value mirror of client state.
//!
//! Each key holds one opaque blob that is overwritten wholesale on every
//! store. Concurrent writers race; the last one wins.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MirrorError {
    #[error("mirror io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mirror key is not a plain name: {0}")]
    InvalidKey(String),

    #[error("mirror is unavailable: {0}")]
    Unavailable(String),
}

pub trait LocalMirror: Send + Sync {
    /// Read the blob stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError` if the backing store cannot be read.
    fn load(&self, key: &str) -> Result<Option<String>, MirrorError>;

    /// Replace the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError` if the backing store cannot be written.
    fn store(&self, key: &str, blob: &str) -> Result<(), MirrorError>;
}

/// Keeps each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileMirror {
    dir: PathBuf,
}

impl FileMirror {
    /// # Errors
    ///
    /// Returns `MirrorError::Io` if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, MirrorError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, MirrorError> {
        let plain = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !plain {
            return Err(MirrorError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl LocalMirror for FileMirror {
    fn load(&self, key: &str) -> Result<Option<String>, MirrorError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &str, blob: &str) -> Result<(), MirrorError> {
        let path = self.path_for(key)?;
        // Each writer gets its own temp file; the rename is the only shared step.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(blob.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| MirrorError::Io(e.error))?;
        tracing::trace!(key, bytes = blob.len(), "mirror stored");
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMirror {
    blobs: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryMirror {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalMirror for InMemoryMirror {
    fn load(&self, key: &str) -> Result<Option<String>, MirrorError> {
        let guard = self
            .blobs
            .lock()
            .map_err(|e| MirrorError::Unavailable(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn store(&self, key: &str, blob: &str) -> Result<(), MirrorError> {
        let mut guard = self
            .blobs
            .lock()
            .map_err(|e| MirrorError::Unavailable(e.to_string()))?;
        guard.insert(key.to_owned(), blob.to_owned());
        Ok(())
    }
}
