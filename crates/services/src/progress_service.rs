use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use storage::repository::{NewProgress, ProgressRepository};
use training_core::model::{
    ExerciseId, NoteId, NoteText, PlanId, ProgressKey, SetCompletion, UserId, WeekWindow,
    WeeklyNote, WeeklyProgress,
};

use crate::Clock;
use crate::error::ProgressServiceError;
use crate::history::{WeekSummary, summarize_weeks};

/// Keeps one `WeeklyProgress` per (user, plan, exercise, week) and its notes.
///
/// Records are created lazily by whichever operation touches a key first.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn ProgressRepository>) -> Self {
        Self { clock, progress }
    }

    fn seed(key: ProgressKey, now: DateTime<Utc>) -> NewProgress {
        NewProgress::new(key, WeekWindow::starting_at(now))
    }

    /// Fetch the record for a key, creating an empty one if needed.
    ///
    /// Repeated calls return the same record with only `updated_at` moved.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Progress` for week 0.
    /// Returns `ProgressServiceError::Storage` if the upsert fails.
    pub async fn get_or_create_progress(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
        user_id: UserId,
        week_number: u32,
    ) -> Result<WeeklyProgress, ProgressServiceError> {
        let key = ProgressKey::new(user_id, plan_id, exercise_id, week_number)?;
        let now = self.clock.now();
        let record = self.progress.get_or_create(Self::seed(key, now), now).await?;
        tracing::debug!(?key, id = ?record.id(), "weekly progress fetched");
        Ok(record)
    }

    /// Append a note to the week, creating the record if it is missing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Note` for blank text.
    /// Returns `ProgressServiceError::Storage` if persistence fails.
    pub async fn add_note(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
        user_id: UserId,
        week_number: u32,
        text: &str,
    ) -> Result<WeeklyNote, ProgressServiceError> {
        let key = ProgressKey::new(user_id, plan_id, exercise_id, week_number)?;
        let text = NoteText::parse(text)?;
        let now = self.clock.now();
        let note = WeeklyNote::new(text, now);
        let record = self
            .progress
            .append_note(Self::seed(key, now), &note, now)
            .await?;
        tracing::debug!(?key, note_id = %note.note_id, notes = record.weekly_notes().len(), "note added");
        Ok(note)
    }

    /// Replace the text of an existing note.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::NoteNotFound` if the record or the note
    /// does not exist; the stored notes are left unchanged.
    /// Returns `ProgressServiceError::Note` for blank text.
    pub async fn edit_note(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
        user_id: UserId,
        week_number: u32,
        note_id: NoteId,
        new_text: &str,
    ) -> Result<WeeklyNote, ProgressServiceError> {
        let key = ProgressKey::new(user_id, plan_id, exercise_id, week_number)?;
        let text = NoteText::parse(new_text)?;
        let edited = self
            .progress
            .edit_note(key, note_id, &text, self.clock.now())
            .await?
            .ok_or(ProgressServiceError::NoteNotFound(note_id))?;
        tracing::debug!(?key, %note_id, "note edited");
        Ok(edited)
    }

    /// Remove a note. Returns `false` if the record or the note was missing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if persistence fails.
    pub async fn delete_note(
        &self,
        plan_id: PlanId,
        exercise_id: ExerciseId,
        user_id: UserId,
        week_number: u32,
        note_id: NoteId,
    ) -> Result<bool, ProgressServiceError> {
        let key = ProgressKey::new(user_id, plan_id, exercise_id, week_number)?;
        let removed = self
            .progress
            .remove_note(key, note_id, self.clock.now())
            .await?;
        tracing::debug!(?key, %note_id, removed, "note delete requested");
        Ok(removed)
    }

    /// Create an empty record for every exercise in weeks `1..=duration_weeks`.
    ///
    /// Week `n` covers `start_date + 7(n-1)` days through six days later.
    /// Returns the number of records created.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::InitializationMismatch` if any of the
    /// records already existed; nothing is written in that case.
    /// Returns `ProgressServiceError::InvalidDuration` for a zero-week plan and
    /// `ProgressServiceError::NoExercises` for an empty exercise list.
    pub async fn initialize_for_plan(
        &self,
        plan_id: PlanId,
        user_id: UserId,
        duration_weeks: u32,
        start_date: DateTime<Utc>,
        exercise_ids: &[ExerciseId],
    ) -> Result<u64, ProgressServiceError> {
        if duration_weeks == 0 {
            return Err(ProgressServiceError::InvalidDuration);
        }
        if exercise_ids.is_empty() {
            return Err(ProgressServiceError::NoExercises);
        }

        let mut seeds = Vec::new();
        for week_number in 1..=duration_weeks {
            let window = WeekWindow::for_plan_week(start_date, week_number);
            for exercise_id in exercise_ids {
                let key = ProgressKey::new(user_id, plan_id, *exercise_id, week_number)?;
                seeds.push(NewProgress::new(key, window));
            }
        }

        let expected = u64::from(duration_weeks) * exercise_ids.len() as u64;
        let inserted = self
            .progress
            .insert_shells(&seeds, self.clock.now())
            .await?;
        if inserted != expected {
            tracing::warn!(%plan_id, %user_id, expected, inserted, "plan initialization mismatch");
            return Err(ProgressServiceError::InitializationMismatch { expected, inserted });
        }

        tracing::info!(%plan_id, %user_id, duration_weeks, records = inserted, "plan progress initialized");
        Ok(inserted)
    }

    /// Store an absolute completed-set count for a key.
    ///
    /// The count is clamped to `[0, total_sets]` and the done flag is derived
    /// from it; callers cannot set the flag directly.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if persistence fails.
    pub async fn record_sets(
        &self,
        key: ProgressKey,
        sets_completed: u32,
        total_sets: u32,
    ) -> Result<WeeklyProgress, ProgressServiceError> {
        let now = self.clock.now();
        let completion = SetCompletion::from_count(sets_completed, total_sets);
        let record = self
            .progress
            .record_sets(Self::seed(key, now), completion, now)
            .await?;
        tracing::debug!(
            ?key,
            sets = completion.sets_completed,
            done = completion.is_exercise_done,
            "sets recorded"
        );
        Ok(record)
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn get_progress(
        &self,
        key: ProgressKey,
    ) -> Result<Option<WeeklyProgress>, ProgressServiceError> {
        Ok(self.progress.get_progress(key).await?)
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn list_plan_progress(
        &self,
        plan_id: PlanId,
        user_id: UserId,
    ) -> Result<Vec<WeeklyProgress>, ProgressServiceError> {
        Ok(self.progress.list_for_plan(user_id, plan_id).await?)
    }

    /// Delete a record and its notes. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the delete fails.
    pub async fn delete_progress(&self, key: ProgressKey) -> Result<bool, ProgressServiceError> {
        let deleted = self.progress.delete_progress(key).await?;
        if deleted {
            tracing::info!(?key, "weekly progress deleted");
        }
        Ok(deleted)
    }

    /// Per-week totals for a plan, for history charts.
    ///
    /// `total_sets` maps each exercise to its planned sets per week.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn weekly_history(
        &self,
        plan_id: PlanId,
        user_id: UserId,
        total_sets: &HashMap<ExerciseId, u32>,
    ) -> Result<Vec<WeekSummary>, ProgressServiceError> {
        let records = self.progress.list_for_plan(user_id, plan_id).await?;
        Ok(summarize_weeks(&records, total_sets))
    }
}
