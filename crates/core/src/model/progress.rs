use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::completion::{ProgressState, SetCompletion};
use crate::model::ids::{ExerciseId, NoteId, PlanId, ProgressId, RecordId, UserId};
use crate::model::note::{NoteText, WeeklyNote};
use crate::model::window::WeekWindow;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("week number must be at least 1")]
    InvalidWeekNumber,

    #[error("invalid persisted state: {0}")]
    InvalidPersistedState(String),
}

//
// ─── KEY ───────────────────────────────────────────────────────────────────────
//

/// Natural key of a weekly progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgressKey {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub exercise_id: ExerciseId,
    pub week_number: u32,
}

impl ProgressKey {
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidWeekNumber` for week 0.
    pub fn new(
        user_id: UserId,
        plan_id: PlanId,
        exercise_id: ExerciseId,
        week_number: u32,
    ) -> Result<Self, ProgressError> {
        if week_number == 0 {
            return Err(ProgressError::InvalidWeekNumber);
        }
        Ok(Self {
            user_id,
            plan_id,
            exercise_id,
            week_number,
        })
    }
}

//
// ─── WEEKLY PROGRESS ───────────────────────────────────────────────────────────
//

/// Sets completed for one exercise of one plan in one week, plus that
/// week's notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyProgress {
    id: RecordId,
    key: ProgressKey,
    sets_completed: u32,
    is_exercise_done: bool,
    weekly_notes: Vec<WeeklyNote>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WeeklyProgress {
    /// A fresh record with no sets completed and no notes.
    #[must_use]
    pub fn shell(id: RecordId, key: ProgressKey, window: WeekWindow, now: DateTime<Utc>) -> Self {
        Self {
            id,
            key,
            sets_completed: 0,
            is_exercise_done: false,
            weekly_notes: Vec::new(),
            start_date: window.start,
            end_date: window.end,
            created_at: now,
            updated_at: now,
        }
    }

    /// A client-side record that has not been confirmed by storage yet.
    #[must_use]
    pub fn provisional(key: ProgressKey, window: WeekWindow, now: DateTime<Utc>) -> Self {
        Self::shell(RecordId::provisional(), key, window, now)
    }

    /// Rehydrate a record from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidPersistedState` if the window or the
    /// timestamps are inverted.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: ProgressId,
        key: ProgressKey,
        sets_completed: u32,
        is_exercise_done: bool,
        weekly_notes: Vec<WeeklyNote>,
        window: WeekWindow,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if window.end < window.start {
            return Err(ProgressError::InvalidPersistedState(
                "end_date before start_date".into(),
            ));
        }
        if updated_at < created_at {
            return Err(ProgressError::InvalidPersistedState(
                "updated_at before created_at".into(),
            ));
        }
        Ok(Self {
            id: RecordId::Stored(id),
            key,
            sets_completed,
            is_exercise_done,
            weekly_notes,
            start_date: window.start,
            end_date: window.end,
            created_at,
            updated_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    #[must_use]
    pub fn key(&self) -> ProgressKey {
        self.key
    }

    #[must_use]
    pub fn sets_completed(&self) -> u32 {
        self.sets_completed
    }

    #[must_use]
    pub fn is_exercise_done(&self) -> bool {
        self.is_exercise_done
    }

    #[must_use]
    pub fn weekly_notes(&self) -> &[WeeklyNote] {
        &self.weekly_notes
    }

    #[must_use]
    pub fn window(&self) -> WeekWindow {
        WeekWindow {
            start: self.start_date,
            end: self.end_date,
        }
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[must_use]
    pub fn state(&self, total_sets: u32) -> ProgressState {
        ProgressState::of(self.sets_completed, total_sets)
    }

    #[must_use]
    pub fn note(&self, note_id: NoteId) -> Option<&WeeklyNote> {
        self.weekly_notes.iter().find(|n| n.note_id == note_id)
    }

    // Mutations

    pub fn apply_completion(&mut self, completion: SetCompletion, now: DateTime<Utc>) {
        self.sets_completed = completion.sets_completed;
        self.is_exercise_done = completion.is_exercise_done;
        self.touch(now);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    pub fn push_note(&mut self, note: WeeklyNote, now: DateTime<Utc>) {
        self.weekly_notes.push(note);
        self.touch(now);
    }

    /// Overwrite text and date of a note in place.
    ///
    /// Returns the edited note, or `None` if no note has that id.
    pub fn edit_note(
        &mut self,
        note_id: NoteId,
        text: NoteText,
        now: DateTime<Utc>,
    ) -> Option<WeeklyNote> {
        let note = self.weekly_notes.iter_mut().find(|n| n.note_id == note_id)?;
        note.rewrite(text, now);
        let edited = note.clone();
        self.touch(now);
        Some(edited)
    }

    /// Returns true if a note was removed.
    pub fn remove_note(&mut self, note_id: NoteId, now: DateTime<Utc>) -> bool {
        let before = self.weekly_notes.len();
        self.weekly_notes.retain(|n| n.note_id != note_id);
        let removed = self.weekly_notes.len() != before;
        if removed {
            self.touch(now);
        }
        removed
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn key() -> ProgressKey {
        ProgressKey::new(UserId::new(1), PlanId::new(2), ExerciseId::new(3), 1).unwrap()
    }

    fn shell() -> WeeklyProgress {
        WeeklyProgress::shell(
            RecordId::Stored(ProgressId::new(10)),
            key(),
            WeekWindow::starting_at(fixed_now()),
            fixed_now(),
        )
    }

    #[test]
    fn week_zero_is_rejected() {
        let err = ProgressKey::new(UserId::new(1), PlanId::new(1), ExerciseId::new(1), 0)
            .unwrap_err();
        assert_eq!(err, ProgressError::InvalidWeekNumber);
    }

    #[test]
    fn shell_starts_initialized() {
        let p = shell();
        assert_eq!(p.sets_completed(), 0);
        assert!(!p.is_exercise_done());
        assert!(p.weekly_notes().is_empty());
        assert_eq!(p.state(4), ProgressState::Initialized);
    }

    #[test]
    fn apply_completion_keeps_flag_in_sync() {
        let mut p = shell();
        let later = fixed_now() + Duration::minutes(5);
        p.apply_completion(SetCompletion::compute(0, 3, 3, false), later);
        assert_eq!(p.sets_completed(), 3);
        assert!(p.is_exercise_done());
        assert_eq!(p.updated_at(), later);
    }

    #[test]
    fn edit_unknown_note_leaves_notes_untouched() {
        let mut p = shell();
        p.push_note(WeeklyNote::new(NoteText::parse("one").unwrap(), fixed_now()), fixed_now());
        let before = p.weekly_notes().to_vec();
        let edited = p.edit_note(NoteId::generate(), NoteText::parse("two").unwrap(), fixed_now());
        assert!(edited.is_none());
        assert_eq!(p.weekly_notes(), before.as_slice());
    }

    #[test]
    fn remove_note_reports_whether_anything_changed() {
        let mut p = shell();
        let note = WeeklyNote::new(NoteText::parse("x").unwrap(), fixed_now());
        let id = note.note_id;
        p.push_note(note, fixed_now());
        assert!(p.remove_note(id, fixed_now()));
        assert!(!p.remove_note(id, fixed_now()));
    }

    #[test]
    fn from_persisted_rejects_inverted_window() {
        let window = WeekWindow {
            start: fixed_now(),
            end: fixed_now() - Duration::days(1),
        };
        let err = WeeklyProgress::from_persisted(
            ProgressId::new(1),
            key(),
            0,
            false,
            Vec::new(),
            window,
            fixed_now(),
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressError::InvalidPersistedState(_)));
    }

    #[test]
    fn provisional_record_carries_provisional_id() {
        let p = WeeklyProgress::provisional(key(), WeekWindow::starting_at(fixed_now()), fixed_now());
        assert!(p.id().is_provisional());
    }
}
