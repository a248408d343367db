use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use training_core::model::{
    NoteId, NoteText, PlanId, ProgressKey, SetCompletion, UserId, WeeklyNote, WeeklyProgress,
};

use super::SqliteRepository;
use super::mapping::{
    KeyColumns, connection, id_i64, map_note_row, map_progress_row, note_id_text, ser,
};
use crate::repository::{NewProgress, ProgressRepository, StorageError};

/// Insert a shell for `seed` or, if the key exists, only bump `updated_at`.
async fn upsert_touch(
    conn: &mut SqliteConnection,
    seed: NewProgress,
    now: DateTime<Utc>,
) -> Result<i64, StorageError> {
    let k = KeyColumns::from_key(seed.key)?;
    let row = sqlx::query(
        r"
        INSERT INTO weekly_progress (
            user_id, plan_id, exercise_id, week_number,
            sets_completed, is_exercise_done, start_date, end_date, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?6, ?7, ?7)
        ON CONFLICT(user_id, plan_id, exercise_id, week_number) DO UPDATE SET
            updated_at = MAX(weekly_progress.updated_at, excluded.updated_at)
        RETURNING id
        ",
    )
    .bind(k.user_id)
    .bind(k.plan_id)
    .bind(k.exercise_id)
    .bind(k.week_number)
    .bind(seed.window.start)
    .bind(seed.window.end)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(connection)?;

    row.try_get("id").map_err(ser)
}

async fn find_id(
    conn: &mut SqliteConnection,
    key: ProgressKey,
) -> Result<Option<i64>, StorageError> {
    let k = KeyColumns::from_key(key)?;
    let row = sqlx::query(
        r"
        SELECT id FROM weekly_progress
        WHERE user_id = ?1 AND plan_id = ?2 AND exercise_id = ?3 AND week_number = ?4
        ",
    )
    .bind(k.user_id)
    .bind(k.plan_id)
    .bind(k.exercise_id)
    .bind(k.week_number)
    .fetch_optional(&mut *conn)
    .await
    .map_err(connection)?;

    row.map(|r| r.try_get("id").map_err(ser)).transpose()
}

async fn load_notes(
    conn: &mut SqliteConnection,
    progress_id: i64,
) -> Result<Vec<WeeklyNote>, StorageError> {
    let rows = sqlx::query(
        r"
        SELECT note_id, date, note FROM weekly_notes
        WHERE progress_id = ?1
        ORDER BY position ASC
        ",
    )
    .bind(progress_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(connection)?;

    rows.iter().map(map_note_row).collect()
}

async fn load_by_id(
    conn: &mut SqliteConnection,
    progress_id: i64,
) -> Result<WeeklyProgress, StorageError> {
    let row = sqlx::query(
        r"
        SELECT
            id, user_id, plan_id, exercise_id, week_number, sets_completed,
            is_exercise_done, start_date, end_date, created_at, updated_at
        FROM weekly_progress
        WHERE id = ?1
        ",
    )
    .bind(progress_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(connection)?
    .ok_or(StorageError::NotFound)?;

    let notes = load_notes(conn, progress_id).await?;
    map_progress_row(&row, notes)
}

async fn touch_by_id(
    conn: &mut SqliteConnection,
    progress_id: i64,
    now: DateTime<Utc>,
) -> Result<(), StorageError> {
    sqlx::query("UPDATE weekly_progress SET updated_at = MAX(updated_at, ?1) WHERE id = ?2")
        .bind(now)
        .bind(progress_id)
        .execute(&mut *conn)
        .await
        .map_err(connection)?;
    Ok(())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_or_create(
        &self,
        seed: NewProgress,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgress, StorageError> {
        let mut tx = self.pool.begin().await.map_err(connection)?;
        let id = upsert_touch(&mut tx, seed, now).await?;
        let record = load_by_id(&mut tx, id).await?;
        tx.commit().await.map_err(connection)?;
        Ok(record)
    }

    async fn get_progress(
        &self,
        key: ProgressKey,
    ) -> Result<Option<WeeklyProgress>, StorageError> {
        let mut conn = self.pool.acquire().await.map_err(connection)?;
        match find_id(&mut conn, key).await? {
            Some(id) => load_by_id(&mut conn, id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_for_plan(
        &self,
        user_id: UserId,
        plan_id: PlanId,
    ) -> Result<Vec<WeeklyProgress>, StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let plan = id_i64("plan_id", plan_id.value())?;

        let note_rows = sqlx::query(
            r"
            SELECT n.progress_id, n.note_id, n.date, n.note
            FROM weekly_notes n
            JOIN weekly_progress p ON p.id = n.progress_id
            WHERE p.user_id = ?1 AND p.plan_id = ?2
            ORDER BY n.progress_id ASC, n.position ASC
            ",
        )
        .bind(user)
        .bind(plan)
        .fetch_all(&self.pool)
        .await
        .map_err(connection)?;

        let mut notes: HashMap<i64, Vec<WeeklyNote>> = HashMap::new();
        for row in &note_rows {
            let progress_id: i64 = row.try_get("progress_id").map_err(ser)?;
            notes.entry(progress_id).or_default().push(map_note_row(row)?);
        }

        let rows = sqlx::query(
            r"
            SELECT
                id, user_id, plan_id, exercise_id, week_number, sets_completed,
                is_exercise_done, start_date, end_date, created_at, updated_at
            FROM weekly_progress
            WHERE user_id = ?1 AND plan_id = ?2
            ORDER BY week_number ASC, exercise_id ASC
            ",
        )
        .bind(user)
        .bind(plan)
        .fetch_all(&self.pool)
        .await
        .map_err(connection)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            out.push(map_progress_row(&row, notes.remove(&id).unwrap_or_default())?);
        }
        Ok(out)
    }

    async fn append_note(
        &self,
        seed: NewProgress,
        note: &WeeklyNote,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgress, StorageError> {
        let mut tx = self.pool.begin().await.map_err(connection)?;
        let id = upsert_touch(&mut tx, seed, now).await?;

        sqlx::query(
            r"
            INSERT INTO weekly_notes (note_id, progress_id, position, date, note)
            VALUES (
                ?1,
                ?2,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM weekly_notes WHERE progress_id = ?2),
                ?3,
                ?4
            )
            ",
        )
        .bind(note_id_text(note.note_id))
        .bind(id)
        .bind(note.date)
        .bind(note.note.as_str())
        .execute(&mut *tx)
        .await
        .map_err(connection)?;

        let record = load_by_id(&mut tx, id).await?;
        tx.commit().await.map_err(connection)?;
        Ok(record)
    }

    async fn edit_note(
        &self,
        key: ProgressKey,
        note_id: NoteId,
        text: &NoteText,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklyNote>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(connection)?;
        let Some(progress_id) = find_id(&mut tx, key).await? else {
            return Ok(None);
        };

        let res = sqlx::query(
            r"
            UPDATE weekly_notes SET note = ?1, date = ?2
            WHERE note_id = ?3 AND progress_id = ?4
            ",
        )
        .bind(text.as_str())
        .bind(now)
        .bind(note_id_text(note_id))
        .bind(progress_id)
        .execute(&mut *tx)
        .await
        .map_err(connection)?;

        if res.rows_affected() == 0 {
            return Ok(None);
        }

        touch_by_id(&mut tx, progress_id, now).await?;
        tx.commit().await.map_err(connection)?;

        Ok(Some(WeeklyNote {
            note_id,
            date: now,
            note: text.as_str().to_owned(),
        }))
    }

    async fn remove_note(
        &self,
        key: ProgressKey,
        note_id: NoteId,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await.map_err(connection)?;
        let Some(progress_id) = find_id(&mut tx, key).await? else {
            return Ok(false);
        };

        let res = sqlx::query("DELETE FROM weekly_notes WHERE note_id = ?1 AND progress_id = ?2")
            .bind(note_id_text(note_id))
            .bind(progress_id)
            .execute(&mut *tx)
            .await
            .map_err(connection)?;

        if res.rows_affected() == 0 {
            return Ok(false);
        }

        touch_by_id(&mut tx, progress_id, now).await?;
        tx.commit().await.map_err(connection)?;
        Ok(true)
    }

    async fn insert_shells(
        &self,
        seeds: &[NewProgress],
        now: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(connection)?;
        let mut inserted = 0_u64;

        for seed in seeds {
            let k = KeyColumns::from_key(seed.key)?;
            let res = sqlx::query(
                r"
                INSERT INTO weekly_progress (
                    user_id, plan_id, exercise_id, week_number,
                    sets_completed, is_exercise_done, start_date, end_date, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?6, ?7, ?7)
                ON CONFLICT(user_id, plan_id, exercise_id, week_number) DO NOTHING
                ",
            )
            .bind(k.user_id)
            .bind(k.plan_id)
            .bind(k.exercise_id)
            .bind(k.week_number)
            .bind(seed.window.start)
            .bind(seed.window.end)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(connection)?;
            inserted += res.rows_affected();
        }

        let expected = u64::try_from(seeds.len())
            .map_err(|_| StorageError::Serialization("shell count overflow".into()))?;
        if inserted == expected {
            tx.commit().await.map_err(connection)?;
        } else {
            tx.rollback().await.map_err(connection)?;
        }
        Ok(inserted)
    }

    async fn record_sets(
        &self,
        seed: NewProgress,
        completion: SetCompletion,
        now: DateTime<Utc>,
    ) -> Result<WeeklyProgress, StorageError> {
        let k = KeyColumns::from_key(seed.key)?;
        let mut tx = self.pool.begin().await.map_err(connection)?;

        let row = sqlx::query(
            r"
            INSERT INTO weekly_progress (
                user_id, plan_id, exercise_id, week_number,
                sets_completed, is_exercise_done, start_date, end_date, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT(user_id, plan_id, exercise_id, week_number) DO UPDATE SET
                sets_completed = excluded.sets_completed,
                is_exercise_done = excluded.is_exercise_done,
                updated_at = MAX(weekly_progress.updated_at, excluded.updated_at)
            RETURNING id
            ",
        )
        .bind(k.user_id)
        .bind(k.plan_id)
        .bind(k.exercise_id)
        .bind(k.week_number)
        .bind(i64::from(completion.sets_completed))
        .bind(completion.is_exercise_done)
        .bind(seed.window.start)
        .bind(seed.window.end)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(connection)?;

        let id: i64 = row.try_get("id").map_err(ser)?;
        let record = load_by_id(&mut tx, id).await?;
        tx.commit().await.map_err(connection)?;
        Ok(record)
    }

    async fn delete_progress(&self, key: ProgressKey) -> Result<bool, StorageError> {
        let k = KeyColumns::from_key(key)?;
        let res = sqlx::query(
            r"
            DELETE FROM weekly_progress
            WHERE user_id = ?1 AND plan_id = ?2 AND exercise_id = ?3 AND week_number = ?4
            ",
        )
        .bind(k.user_id)
        .bind(k.plan_id)
        .bind(k.exercise_id)
        .bind(k.week_number)
        .execute(&self.pool)
        .await
        .map_err(connection)?;

        Ok(res.rows_affected() > 0)
    }
}
