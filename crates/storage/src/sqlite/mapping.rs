use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use training_core::model::{
    ExerciseId, NoteId, PlanId, ProgressId, ProgressKey, UserId, WeekWindow, WeeklyNote,
    WeeklyProgress,
};
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn connection<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Natural-key columns in bind order: user, plan, exercise, week.
#[derive(Debug, Clone, Copy)]
pub(crate) struct KeyColumns {
    pub user_id: i64,
    pub plan_id: i64,
    pub exercise_id: i64,
    pub week_number: i64,
}

impl KeyColumns {
    pub(crate) fn from_key(key: ProgressKey) -> Result<Self, StorageError> {
        Ok(Self {
            user_id: id_i64("user_id", key.user_id.value())?,
            plan_id: id_i64("plan_id", key.plan_id.value())?,
            exercise_id: id_i64("exercise_id", key.exercise_id.value())?,
            week_number: i64::from(key.week_number),
        })
    }
}

pub(crate) fn note_id_text(id: NoteId) -> String {
    id.as_uuid().to_string()
}

pub(crate) fn map_note_row(row: &SqliteRow) -> Result<WeeklyNote, StorageError> {
    let raw_id: String = row.try_get("note_id").map_err(ser)?;
    let note_id = Uuid::parse_str(&raw_id)
        .map(NoteId::from_uuid)
        .map_err(|_| StorageError::Serialization(format!("invalid note_id: {raw_id}")))?;
    Ok(WeeklyNote {
        note_id,
        date: row.try_get("date").map_err(ser)?,
        note: row.try_get("note").map_err(ser)?,
    })
}

fn map_key(row: &SqliteRow) -> Result<ProgressKey, StorageError> {
    let user_id = UserId::new(i64_to_u64("user_id", row.try_get("user_id").map_err(ser)?)?);
    let plan_id = PlanId::new(i64_to_u64("plan_id", row.try_get("plan_id").map_err(ser)?)?);
    let exercise_id = ExerciseId::new(i64_to_u64(
        "exercise_id",
        row.try_get("exercise_id").map_err(ser)?,
    )?);
    let week_number = u32_from_i64("week_number", row.try_get("week_number").map_err(ser)?)?;
    ProgressKey::new(user_id, plan_id, exercise_id, week_number).map_err(ser)
}

pub(crate) fn map_progress_row(
    row: &SqliteRow,
    notes: Vec<WeeklyNote>,
) -> Result<WeeklyProgress, StorageError> {
    let id = ProgressId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?);
    let sets_completed = u32_from_i64(
        "sets_completed",
        row.try_get("sets_completed").map_err(ser)?,
    )?;
    let window = WeekWindow {
        start: row.try_get("start_date").map_err(ser)?,
        end: row.try_get("end_date").map_err(ser)?,
    };

    WeeklyProgress::from_persisted(
        id,
        map_key(row)?,
        sets_completed,
        row.try_get::<bool, _>("is_exercise_done").map_err(ser)?,
        notes,
        window,
        row.try_get("created_at").map_err(ser)?,
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}
