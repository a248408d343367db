use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use services::{AppServices, Clock, LocalGateway, ProgressService, TrackerEvent};
use storage::mirror::{FileMirror, InMemoryMirror, LocalMirror};
use storage::repository::InMemoryRepository;
use training_core::model::{ExerciseId, PlanId, ProgressKey, UserId};
use training_core::time::fixed_now;

fn memory_url(name: &str) -> String {
    format!("sqlite:file:{name}?mode=memory&cache=shared")
}

async fn next_outcome(events: &mut tokio::sync::broadcast::Receiver<TrackerEvent>) -> TrackerEvent {
    loop {
        let event = events.recv().await.expect("event channel open");
        if !matches!(event, TrackerEvent::Notice(_)) {
            return event;
        }
    }
}

#[tokio::test]
async fn optimistic_updates_are_confirmed_into_sqlite() {
    let app = AppServices::new_sqlite(
        &memory_url("flow_confirm"),
        Clock::fixed(fixed_now()),
        Arc::new(InMemoryMirror::new()),
        UserId::new(1),
    )
    .await
    .expect("services");
    let tracker = app.tracker();
    let mut events = tracker.subscribe();
    let (plan, bench) = (PlanId::new(3), ExerciseId::new(11));

    let first = tracker
        .update_set_completion(plan, 1, bench, 2, 3, false)
        .unwrap();
    assert_eq!(first.sets_completed(), 2);
    assert!(matches!(
        next_outcome(&mut events).await,
        TrackerEvent::Confirmed { sets_completed: 2, .. }
    ));

    let second = tracker
        .update_set_completion(plan, 1, bench, 5, 3, false)
        .unwrap();
    assert_eq!(second.sets_completed(), 3);
    assert!(second.is_exercise_done());
    assert!(matches!(
        next_outcome(&mut events).await,
        TrackerEvent::Confirmed { sets_completed: 3, .. }
    ));

    let key = ProgressKey::new(UserId::new(1), plan, bench, 1).unwrap();
    let stored = app.progress().get_progress(key).await.unwrap().unwrap();
    assert_eq!(stored.sets_completed(), 3);
    assert!(stored.is_exercise_done());
    assert!(!stored.id().is_provisional());
}

#[tokio::test]
async fn initialized_plan_feeds_weekly_history() {
    let app = AppServices::new_sqlite(
        &memory_url("flow_history"),
        Clock::fixed(fixed_now()),
        Arc::new(InMemoryMirror::new()),
        UserId::new(2),
    )
    .await
    .expect("services");
    let progress = app.progress();
    let plan = PlanId::new(8);
    let (squat, row) = (ExerciseId::new(1), ExerciseId::new(2));

    let created = progress
        .initialize_for_plan(plan, app.user_id(), 2, fixed_now(), &[squat, row])
        .await
        .unwrap();
    assert_eq!(created, 4);

    let key = ProgressKey::new(app.user_id(), plan, squat, 1).unwrap();
    progress.record_sets(key, 4, 4).await.unwrap();
    progress
        .add_note(plan, row, app.user_id(), 2, "grip gave out")
        .await
        .unwrap();

    let totals = HashMap::from([(squat, 4), (row, 3)]);
    let history = progress
        .weekly_history(plan, app.user_id(), &totals)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].sets_completed, 4);
    assert_eq!(history[0].exercises_done, 1);
    assert_eq!(history[1].sets_planned, 7);

    let week2 = progress
        .get_progress(ProgressKey::new(app.user_id(), plan, row, 2).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(week2.window().start, fixed_now() + Duration::days(7));
    assert_eq!(week2.weekly_notes().len(), 1);
}

#[tokio::test]
async fn tracker_state_survives_restart_through_file_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let url = memory_url("flow_restart");
    let (plan, press) = (PlanId::new(4), ExerciseId::new(5));

    {
        let mirror = FileMirror::open(dir.path()).unwrap();
        let app = AppServices::new_sqlite(&url, Clock::fixed(fixed_now()), Arc::new(mirror), UserId::new(1))
            .await
            .expect("services");
        let tracker = app.tracker();
        let mut events = tracker.subscribe();
        tracker
            .update_set_completion(plan, 2, press, 0, 5, true)
            .unwrap();
        next_outcome(&mut events).await;
    }

    let mirror = FileMirror::open(dir.path()).unwrap();
    let app = AppServices::new_sqlite(&url, Clock::fixed(fixed_now()), Arc::new(mirror), UserId::new(1))
        .await
        .expect("services");
    let week = app.tracker().week_progress(plan, 2);
    assert_eq!(week.len(), 1);
    assert_eq!(week[0].sets_completed(), 5);
    assert!(week[0].is_exercise_done());
}

#[tokio::test]
async fn sets_hydrated_from_storage_continue_from_stored_count() {
    let app = AppServices::new_sqlite(
        &memory_url("flow_hydrate_local"),
        Clock::fixed(fixed_now()),
        Arc::new(InMemoryMirror::new()),
        UserId::new(1),
    )
    .await
    .expect("services");
    let (plan, dip) = (PlanId::new(6), ExerciseId::new(2));
    let key = ProgressKey::new(app.user_id(), plan, dip, 1).unwrap();
    app.progress().record_sets(key, 2, 4).await.unwrap();

    app.hydrate_week(plan, 1).await.unwrap();
    let tracker = app.tracker();
    let mut events = tracker.subscribe();
    let updated = tracker
        .update_set_completion(plan, 1, dip, 1, 4, false)
        .unwrap();
    assert_eq!(updated.sets_completed(), 3);
    assert!(matches!(
        next_outcome(&mut events).await,
        TrackerEvent::Confirmed { sets_completed: 3, .. }
    ));
}

#[tokio::test]
async fn remote_gateway_runs_keep_counting_from_the_mirror() {
    let clock = Clock::fixed(fixed_now());
    let mirror: Arc<dyn LocalMirror> = Arc::new(InMemoryMirror::new());
    // Confirmations land here; the local store below never sees them.
    let remote = Arc::new(ProgressService::new(
        clock.clone(),
        Arc::new(InMemoryRepository::new()),
    ));
    let local = Arc::new(ProgressService::new(
        clock.clone(),
        Arc::new(InMemoryRepository::new()),
    ));
    let (plan, curl) = (PlanId::new(9), ExerciseId::new(4));

    let mut counts = Vec::new();
    for _ in 0..2 {
        let app = AppServices::with_remote_gateway(
            clock.clone(),
            Arc::clone(&local),
            Arc::clone(&mirror),
            Arc::new(LocalGateway::new(Arc::clone(&remote))),
            UserId::new(1),
        )
        .expect("services");
        app.hydrate_week(plan, 1).await.unwrap();
        let tracker = app.tracker();
        let mut events = tracker.subscribe();
        let updated = tracker
            .update_set_completion(plan, 1, curl, 1, 3, false)
            .unwrap();
        counts.push(updated.sets_completed());
        assert!(matches!(
            next_outcome(&mut events).await,
            TrackerEvent::Confirmed { .. }
        ));
    }
    assert_eq!(counts, [1, 2]);

    let key = ProgressKey::new(UserId::new(1), plan, curl, 1).unwrap();
    let confirmed = remote.get_progress(key).await.unwrap().unwrap();
    assert_eq!(confirmed.sets_completed(), 2);
    assert!(local.get_progress(key).await.unwrap().is_none());
}
