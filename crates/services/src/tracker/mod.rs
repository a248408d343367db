//! Optimistic set tracking.
//!
//! `ProgressTracker` applies a set update to its in-memory state and the local
//! mirror right away, then confirms it in the background. A refused or failed
//! confirmation puts the affected week back to how it was before the update.

mod events;
mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use storage::mirror::LocalMirror;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use training_core::model::{
    ExerciseId, PlanId, ProgressKey, SetCompletion, UserId, WeekWindow, WeeklyProgress,
};

pub use events::{Notice, Severity, TrackerEvent};
pub use state::TrackerState;

use crate::Clock;
use crate::error::TrackerError;
use crate::gateway::{ProgressGateway, SetCompletionRequest};

const MIRROR_KEY_PREFIX: &str = "training-progress-state";

/// Mirror key holding the whole tracker state of one user.
#[must_use]
pub fn mirror_key(user_id: UserId) -> String {
    format!("{MIRROR_KEY_PREFIX}-{user_id}")
}

const EVENT_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<Inner>,
}

struct Inner {
    user_id: UserId,
    mirror_key: String,
    clock: Clock,
    state: Mutex<TrackerState>,
    mirror: Arc<dyn LocalMirror>,
    gateway: Arc<dyn ProgressGateway>,
    events: broadcast::Sender<TrackerEvent>,
    runtime: Handle,
}

impl ProgressTracker {
    /// Build a tracker for `user_id`, starting from whatever the mirror holds.
    ///
    /// Must be called from inside a tokio runtime; confirmations are spawned
    /// onto it. A blob that does not parse is logged and replaced by an empty
    /// state.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::NoRuntime` outside a runtime and
    /// `TrackerError::Mirror` if the mirror cannot be read.
    pub fn restore(
        user_id: UserId,
        clock: Clock,
        mirror: Arc<dyn LocalMirror>,
        gateway: Arc<dyn ProgressGateway>,
    ) -> Result<Self, TrackerError> {
        let runtime = Handle::try_current().map_err(|_| TrackerError::NoRuntime)?;

        let mirror_key = mirror_key(user_id);
        let state = match mirror.load(&mirror_key)? {
            Some(blob) => TrackerState::from_json(&blob).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "discarding unreadable progress mirror");
                TrackerState::new()
            }),
            None => TrackerState::new(),
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                user_id,
                mirror_key,
                clock,
                state: Mutex::new(state),
                mirror,
                gateway,
                events,
                runtime,
            }),
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.inner.user_id
    }

    /// Receive confirmation outcomes and notices from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.inner.events.subscribe()
    }

    /// Apply a set change optimistically and start confirming it.
    ///
    /// The returned record already carries the new count. The count is
    /// `total_sets` when `complete_all` is set, otherwise the current count
    /// plus `sets_increment`, clamped to `[0, total_sets]`. A week seen for the
    /// first time gets a provisional record.
    ///
    /// Confirmation failures never surface here; they arrive as
    /// [`TrackerEvent::RolledBack`] plus an error [`Notice`].
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::Progress` for week 0.
    pub fn update_set_completion(
        &self,
        plan_id: PlanId,
        week_number: u32,
        exercise_id: ExerciseId,
        sets_increment: i64,
        total_sets: u32,
        complete_all: bool,
    ) -> Result<WeeklyProgress, TrackerError> {
        let key = ProgressKey::new(self.inner.user_id, plan_id, exercise_id, week_number)?;
        let now = self.inner.clock.now();

        let (record, snapshot) = {
            let mut state = self.inner.lock_state();
            let snapshot = state.snapshot_week(plan_id, week_number);

            let mut record = state.find(&key).cloned().unwrap_or_else(|| {
                WeeklyProgress::provisional(key, WeekWindow::starting_at(now), now)
            });
            let completion = SetCompletion::compute(
                record.sets_completed(),
                sets_increment,
                total_sets,
                complete_all,
            );
            record.apply_completion(completion, now);

            state.upsert_record(record.clone());
            self.inner.persist(&state);
            (record, snapshot)
        };

        tracing::debug!(
            ?key,
            sets = record.sets_completed(),
            done = record.is_exercise_done(),
            "optimistic set update"
        );

        let request = SetCompletionRequest::new(key, record.sets_completed(), total_sets);
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.confirm(request, snapshot).await });

        Ok(record)
    }

    /// Current records for one week.
    #[must_use]
    pub fn week_progress(&self, plan_id: PlanId, week_number: u32) -> Vec<WeeklyProgress> {
        self.inner.lock_state().week(plan_id, week_number).to_vec()
    }

    /// Replace one week with authoritative records, e.g. after a load.
    pub fn replace_week(&self, plan_id: PlanId, week_number: u32, records: Vec<WeeklyProgress>) {
        let mut state = self.inner.lock_state();
        state.replace_week(plan_id, week_number, records);
        self.inner.persist(&state);
    }

    #[must_use]
    pub fn state_snapshot(&self) -> TrackerState {
        self.inner.lock_state().clone()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mirror failures are logged and announced as a warning; the in-memory
    /// state stays authoritative.
    fn persist(&self, state: &TrackerState) {
        let stored = match state.to_json() {
            Ok(blob) => self
                .mirror
                .store(&self.mirror_key, &blob)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(reason) = stored {
            tracing::warn!(%reason, key = %self.mirror_key, "failed to write progress mirror");
            let _ = self.events.send(TrackerEvent::Notice(Notice::warning(format!(
                "Progress could not be saved locally: {reason}"
            ))));
        }
    }

    async fn confirm(&self, request: SetCompletionRequest, snapshot: Option<Vec<WeeklyProgress>>) {
        let key = ProgressKey {
            user_id: request.user_id,
            plan_id: request.plan_id,
            exercise_id: request.exercise_id,
            week_number: request.week_number,
        };

        let outcome = match self.gateway.confirm_sets(&request).await {
            Ok(response) if response.success => Ok(()),
            Ok(response) => Err(response
                .message
                .unwrap_or_else(|| "update was rejected".to_owned())),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(?key, sets = request.sets_completed, "set update confirmed");
                let _ = self.events.send(TrackerEvent::Confirmed {
                    key,
                    sets_completed: request.sets_completed,
                });
            }
            Err(reason) => {
                tracing::warn!(?key, %reason, "set update failed, rolling back");
                {
                    let mut state = self.lock_state();
                    state.restore_week(key.plan_id, key.week_number, snapshot);
                    self.persist(&state);
                }
                let _ = self.events.send(TrackerEvent::RolledBack { key });
                let _ = self.events.send(TrackerEvent::Notice(Notice::error(format!(
                    "Failed to update progress: {reason}"
                ))));
            }
        }
    }
}
