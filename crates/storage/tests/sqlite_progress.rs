use chrono::Duration;
use storage::repository::{NewProgress, ProgressRepository};
use storage::sqlite::SqliteRepository;
use training_core::model::{
    ExerciseId, NoteId, NoteText, PlanId, ProgressKey, SetCompletion, UserId, WeekWindow,
    WeeklyNote,
};
use training_core::time::fixed_now;

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn seed(exercise: u64, week: u32) -> NewProgress {
    NewProgress::new(
        ProgressKey::new(UserId::new(1), PlanId::new(7), ExerciseId::new(exercise), week).unwrap(),
        WeekWindow::for_plan_week(fixed_now(), week),
    )
}

#[tokio::test]
async fn get_or_create_is_idempotent_and_touches_updated_at() {
    let repo = repo("memdb_get_or_create").await;

    let first = repo.get_or_create(seed(1, 1), fixed_now()).await.unwrap();
    assert_eq!(first.sets_completed(), 0);
    assert!(!first.is_exercise_done());
    assert!(first.weekly_notes().is_empty());
    assert_eq!(first.window().end - first.window().start, Duration::days(6));

    let later = fixed_now() + Duration::minutes(3);
    let second = repo.get_or_create(seed(1, 1), later).await.unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(second.created_at(), fixed_now());
    assert_eq!(second.updated_at(), later);

    let all = repo.list_for_plan(UserId::new(1), PlanId::new(7)).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn concurrent_get_or_create_yields_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("progress.sqlite3").display());
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.get_or_create(seed(2, 1), fixed_now()).await
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
}

#[tokio::test]
async fn notes_keep_insertion_order_and_cascade_on_delete() {
    let repo = repo("memdb_notes").await;
    let s = seed(1, 2);

    let first = WeeklyNote::new(NoteText::parse(" warm-up felt heavy ").unwrap(), fixed_now());
    let second = WeeklyNote::new(NoteText::parse("added a set").unwrap(), fixed_now());
    let created = repo.append_note(s, &first, fixed_now()).await.unwrap();
    assert_eq!(created.weekly_notes().len(), 1);
    assert_eq!(created.weekly_notes()[0].note, "warm-up felt heavy");

    let appended = repo.append_note(s, &second, fixed_now()).await.unwrap();
    let texts: Vec<&str> = appended.weekly_notes().iter().map(|n| n.note.as_str()).collect();
    assert_eq!(texts, vec!["warm-up felt heavy", "added a set"]);

    let later = fixed_now() + Duration::hours(1);
    let edited = repo
        .edit_note(s.key, second.note_id, &NoteText::parse("two extra sets").unwrap(), later)
        .await
        .unwrap()
        .expect("note exists");
    assert_eq!(edited.note, "two extra sets");
    assert_eq!(edited.date, later);

    let missing = repo
        .edit_note(s.key, NoteId::generate(), &NoteText::parse("x").unwrap(), later)
        .await
        .unwrap();
    assert!(missing.is_none());

    assert!(repo.remove_note(s.key, first.note_id, later).await.unwrap());
    assert!(!repo.remove_note(s.key, first.note_id, later).await.unwrap());

    assert!(repo.delete_progress(s.key).await.unwrap());
    assert!(repo.get_progress(s.key).await.unwrap().is_none());
    assert!(!repo.delete_progress(s.key).await.unwrap());
}

#[tokio::test]
async fn insert_shells_is_all_or_nothing() {
    let repo = repo("memdb_shells").await;

    let seeds: Vec<NewProgress> = (1..=4).map(|week| seed(1, week)).collect();
    assert_eq!(repo.insert_shells(&seeds, fixed_now()).await.unwrap(), 4);

    let mut overlapping: Vec<NewProgress> = (4..=6).map(|week| seed(1, week)).collect();
    overlapping.push(seed(2, 1));
    assert_eq!(repo.insert_shells(&overlapping, fixed_now()).await.unwrap(), 3);

    let all = repo.list_for_plan(UserId::new(1), PlanId::new(7)).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[2].window().start, fixed_now() + Duration::days(14));
}

#[tokio::test]
async fn record_sets_upserts_count_and_flag() {
    let repo = repo("memdb_record_sets").await;
    let s = seed(3, 1);

    let partial = repo
        .record_sets(s, SetCompletion::from_count(2, 4), fixed_now())
        .await
        .unwrap();
    assert_eq!(partial.sets_completed(), 2);
    assert!(!partial.is_exercise_done());

    let done = repo
        .record_sets(s, SetCompletion::from_count(4, 4), fixed_now())
        .await
        .unwrap();
    assert_eq!(done.id(), partial.id());
    assert!(done.is_exercise_done());
}

#[tokio::test]
async fn updated_at_never_moves_backwards() {
    let repo = repo("memdb_monotonic_updated_at").await;
    let s = seed(4, 1);
    let later = fixed_now() + Duration::minutes(5);

    repo.get_or_create(s, later).await.unwrap();
    let earlier = repo.get_or_create(s, fixed_now()).await.unwrap();
    assert_eq!(earlier.updated_at(), later);

    let recorded = repo
        .record_sets(s, SetCompletion::from_count(1, 3), fixed_now())
        .await
        .unwrap();
    assert_eq!(recorded.sets_completed(), 1);
    assert_eq!(recorded.updated_at(), later);
}
