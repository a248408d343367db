use std::sync::Arc;

use storage::mirror::LocalMirror;
use storage::repository::Storage;
use training_core::model::{PlanId, UserId, WeeklyProgress};

use crate::Clock;
use crate::error::{AppServicesError, ProgressServiceError};
use crate::gateway::{LocalGateway, ProgressGateway};
use crate::progress_service::ProgressService;
use crate::tracker::ProgressTracker;

/// Which side holds the latest count for a week the tracker is about to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeekSource {
    /// Confirmations are written to local storage.
    Storage,
    /// Confirmations go elsewhere; the mirrored tracker state is the freshest copy.
    Mirror,
}

/// Assembles app-facing services for one user.
#[derive(Clone)]
pub struct AppServices {
    user_id: UserId,
    progress: Arc<ProgressService>,
    tracker: ProgressTracker,
    week_source: WeekSource,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, confirming set updates
    /// in-process.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization or tracker restore fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        mirror: Arc<dyn LocalMirror>,
        user_id: UserId,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::confirming_locally(clock, storage, mirror, user_id)
    }

    /// In-memory storage, for tests and demos.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Tracker` if the tracker cannot be restored.
    pub fn in_memory(
        clock: Clock,
        mirror: Arc<dyn LocalMirror>,
        user_id: UserId,
    ) -> Result<Self, AppServicesError> {
        Self::confirming_locally(clock, Storage::in_memory(), mirror, user_id)
    }

    /// Wire services around a gateway that confirms somewhere other than
    /// `progress`, e.g. `HttpGateway`.
    ///
    /// Local storage never sees those confirmations, so weeks are taken from
    /// the mirror rather than reloaded from `progress`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Tracker` if the tracker cannot be restored.
    pub fn with_remote_gateway(
        clock: Clock,
        progress: Arc<ProgressService>,
        mirror: Arc<dyn LocalMirror>,
        gateway: Arc<dyn ProgressGateway>,
        user_id: UserId,
    ) -> Result<Self, AppServicesError> {
        Self::assemble(clock, progress, mirror, gateway, user_id, WeekSource::Mirror)
    }

    fn confirming_locally(
        clock: Clock,
        storage: Storage,
        mirror: Arc<dyn LocalMirror>,
        user_id: UserId,
    ) -> Result<Self, AppServicesError> {
        let progress = Arc::new(ProgressService::new(clock.clone(), storage.progress));
        let gateway = Arc::new(LocalGateway::new(Arc::clone(&progress)));
        Self::assemble(clock, progress, mirror, gateway, user_id, WeekSource::Storage)
    }

    fn assemble(
        clock: Clock,
        progress: Arc<ProgressService>,
        mirror: Arc<dyn LocalMirror>,
        gateway: Arc<dyn ProgressGateway>,
        user_id: UserId,
        week_source: WeekSource,
    ) -> Result<Self, AppServicesError> {
        let tracker = ProgressTracker::restore(user_id, clock, mirror, gateway)?;
        Ok(Self {
            user_id,
            progress,
            tracker,
            week_source,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn tracker(&self) -> ProgressTracker {
        self.tracker.clone()
    }

    /// Bring the tracker's copy of a week up to date before changing it.
    ///
    /// With local confirmation the week is reloaded from storage. With a
    /// remote gateway the restored mirror already holds the latest counts and
    /// is left alone.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the reload fails.
    pub async fn hydrate_week(
        &self,
        plan_id: PlanId,
        week_number: u32,
    ) -> Result<(), ProgressServiceError> {
        if self.week_source == WeekSource::Mirror {
            tracing::debug!(%plan_id, week_number, "keeping mirrored week for remote gateway");
            return Ok(());
        }

        let records: Vec<WeeklyProgress> = self
            .progress
            .list_plan_progress(plan_id, self.user_id)
            .await?
            .into_iter()
            .filter(|p| p.key().week_number == week_number)
            .collect();
        self.tracker.replace_week(plan_id, week_number, records);
        Ok(())
    }
}
