use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use training_core::model::{
    NoteId, NoteText, PlanId, ProgressId, ProgressKey, RecordId, SetCompletion, UserId,
    WeekWindow, WeeklyNote, WeeklyProgress,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// What a record looks like if an upsert has to create it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewProgress {
    pub key: ProgressKey,
    pub window: WeekWindow,
}

impl NewProgress {
    #[must_use]
    pub fn new(key: ProgressKey, window: WeekWindow) -> Self {
        Self { key, window }
    }
}

/// Repository contract for weekly progress records and their embedded notes.
///
/// Every method that may create a record does so as a single atomic upsert
/// on the natural key, so concurrent callers never produce duplicates.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Find the record for `seed.key`, inserting a shell if it is absent.
    /// Always sets `updated_at` to `now`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the upsert fails.
    async fn get_or_create(
        &self,
        seed: NewProgress,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgress, StorageError>;

    /// Fetch a record by key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_progress(&self, key: ProgressKey)
    -> Result<Option<WeeklyProgress>, StorageError>;

    /// All records of a plan for a user, ordered by week then exercise.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_for_plan(
        &self,
        user_id: UserId,
        plan_id: PlanId,
    ) -> Result<Vec<WeeklyProgress>, StorageError>;

    /// Append a note, creating the record (with the note as its only entry)
    /// if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn append_note(
        &self,
        seed: NewProgress,
        note: &WeeklyNote,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgress, StorageError>;

    /// Overwrite a note's text and date. `Ok(None)` when the record or the
    /// note does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn edit_note(
        &self,
        key: ProgressKey,
        note_id: NoteId,
        text: &NoteText,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklyNote>, StorageError>;

    /// Remove a note. Returns whether a note was actually removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn remove_note(
        &self,
        key: ProgressKey,
        note_id: NoteId,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Insert empty records for every seed.
    ///
    /// Nothing is written unless every seed was new; the return value is the
    /// number of seeds that were new.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn insert_shells(
        &self,
        seeds: &[NewProgress],
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Upsert the completed-set count and done flag for a key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn record_sets(
        &self,
        seed: NewProgress,
        completion: SetCompletion,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgress, StorageError>;

    /// Delete a record and its notes. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    async fn delete_progress(&self, key: ProgressKey) -> Result<bool, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    records: HashMap<ProgressKey, WeeklyProgress>,
    next_id: u64,
}

impl MemoryState {
    fn entry(&mut self, seed: NewProgress, now: DateTime<Utc>) -> &mut WeeklyProgress {
        let next_id = &mut self.next_id;
        self.records.entry(seed.key).or_insert_with(|| {
            *next_id += 1;
            WeeklyProgress::shell(
                RecordId::Stored(ProgressId::new(*next_id)),
                seed.key,
                seed.window,
                now,
            )
        })
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// One mutex guards the whole map, which makes every operation atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_or_create(
        &self,
        seed: NewProgress,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgress, StorageError> {
        let mut guard = self.lock()?;
        let record = guard.entry(seed, now);
        record.touch(now);
        Ok(record.clone())
    }

    async fn get_progress(
        &self,
        key: ProgressKey,
    ) -> Result<Option<WeeklyProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.records.get(&key).cloned())
    }

    async fn list_for_plan(
        &self,
        user_id: UserId,
        plan_id: PlanId,
    ) -> Result<Vec<WeeklyProgress>, StorageError> {
        let guard = self.lock()?;
        let mut found: Vec<WeeklyProgress> = guard
            .records
            .values()
            .filter(|p| p.key().user_id == user_id && p.key().plan_id == plan_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| (p.key().week_number, p.key().exercise_id));
        Ok(found)
    }

    async fn append_note(
        &self,
        seed: NewProgress,
        note: &WeeklyNote,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgress, StorageError> {
        let mut guard = self.lock()?;
        let record = guard.entry(seed, now);
        record.push_note(note.clone(), now);
        Ok(record.clone())
    }

    async fn edit_note(
        &self,
        key: ProgressKey,
        note_id: NoteId,
        text: &NoteText,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklyNote>, StorageError> {
        let mut guard = self.lock()?;
        Ok(guard
            .records
            .get_mut(&key)
            .and_then(|record| record.edit_note(note_id, text.clone(), now)))
    }

    async fn remove_note(
        &self,
        key: ProgressKey,
        note_id: NoteId,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        Ok(guard
            .records
            .get_mut(&key)
            .is_some_and(|record| record.remove_note(note_id, now)))
    }

    async fn insert_shells(
        &self,
        seeds: &[NewProgress],
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut guard = self.lock()?;
        let mut fresh = HashSet::new();
        for seed in seeds {
            if !guard.records.contains_key(&seed.key) {
                fresh.insert(seed.key);
            }
        }
        let count = u64::try_from(fresh.len())
            .map_err(|_| StorageError::Serialization("shell count overflow".into()))?;
        if fresh.len() == seeds.len() {
            for seed in seeds {
                guard.entry(*seed, now);
            }
        }
        Ok(count)
    }

    async fn record_sets(
        &self,
        seed: NewProgress,
        completion: SetCompletion,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgress, StorageError> {
        let mut guard = self.lock()?;
        let record = guard.entry(seed, now);
        record.apply_completion(completion, now);
        Ok(record.clone())
    }

    async fn delete_progress(&self, key: ProgressKey) -> Result<bool, StorageError> {
        let mut guard = self.lock()?;
        Ok(guard.records.remove(&key).is_some())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(InMemoryRepository::new());
        Self { progress }
    }
}
