use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use training_core::model::{PlanId, ProgressKey, WeeklyProgress};

/// Client-side view of weekly progress, grouped by (plan, week).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerState {
    weeks: BTreeMap<(PlanId, u32), Vec<WeeklyProgress>>,
}

/// Mirror blob layout. JSON object keys must be strings, so weeks are stored
/// as a list of entries.
#[derive(Serialize, Deserialize)]
struct StateBlob {
    weeks: Vec<WeekEntry>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeekEntry {
    plan_id: PlanId,
    week_number: u32,
    records: Vec<WeeklyProgress>,
}

impl TrackerState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weeks.is_empty()
    }

    /// Records for one week; empty if the week has never been loaded.
    #[must_use]
    pub fn week(&self, plan_id: PlanId, week_number: u32) -> &[WeeklyProgress] {
        self.weeks
            .get(&(plan_id, week_number))
            .map_or(&[], Vec::as_slice)
    }

    /// Copy of one week, or `None` if the week was absent.
    #[must_use]
    pub fn snapshot_week(&self, plan_id: PlanId, week_number: u32) -> Option<Vec<WeeklyProgress>> {
        self.weeks.get(&(plan_id, week_number)).cloned()
    }

    #[must_use]
    pub fn find(&self, key: &ProgressKey) -> Option<&WeeklyProgress> {
        self.week(key.plan_id, key.week_number)
            .iter()
            .find(|p| p.key() == *key)
    }

    /// Replace the record with the same key, or append it to its week.
    pub fn upsert_record(&mut self, record: WeeklyProgress) {
        let key = record.key();
        let week = self.weeks.entry((key.plan_id, key.week_number)).or_default();
        match week.iter_mut().find(|p| p.key() == key) {
            Some(slot) => *slot = record,
            None => week.push(record),
        }
    }

    pub fn replace_week(&mut self, plan_id: PlanId, week_number: u32, records: Vec<WeeklyProgress>) {
        self.weeks.insert((plan_id, week_number), records);
    }

    /// Put a week back to an earlier snapshot. `None` removes the week.
    pub fn restore_week(
        &mut self,
        plan_id: PlanId,
        week_number: u32,
        snapshot: Option<Vec<WeeklyProgress>>,
    ) {
        match snapshot {
            Some(records) => {
                self.weeks.insert((plan_id, week_number), records);
            }
            None => {
                self.weeks.remove(&(plan_id, week_number));
            }
        }
    }

    /// # Errors
    ///
    /// Returns a serde error if a record cannot be encoded.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let blob = StateBlob {
            weeks: self
                .weeks
                .iter()
                .map(|((plan_id, week_number), records)| WeekEntry {
                    plan_id: *plan_id,
                    week_number: *week_number,
                    records: records.clone(),
                })
                .collect(),
        };
        serde_json::to_string(&blob)
    }

    /// # Errors
    ///
    /// Returns a serde error for a malformed blob.
    pub fn from_json(blob: &str) -> Result<Self, serde_json::Error> {
        let parsed: StateBlob = serde_json::from_str(blob)?;
        let weeks = parsed
            .weeks
            .into_iter()
            .map(|entry| ((entry.plan_id, entry.week_number), entry.records))
            .collect();
        Ok(Self { weeks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use training_core::model::{ExerciseId, SetCompletion, UserId, WeekWindow};
    use training_core::time::fixed_now;

    fn record(exercise: u64, week: u32) -> WeeklyProgress {
        let key = ProgressKey::new(UserId::new(1), PlanId::new(7), ExerciseId::new(exercise), week)
            .unwrap();
        WeeklyProgress::provisional(key, WeekWindow::starting_at(fixed_now()), fixed_now())
    }

    #[test]
    fn upsert_replaces_in_place_and_keeps_order() {
        let mut state = TrackerState::new();
        state.upsert_record(record(1, 1));
        state.upsert_record(record(2, 1));

        let mut changed = record(1, 1);
        changed.apply_completion(SetCompletion::from_count(2, 3), fixed_now());
        state.upsert_record(changed.clone());

        let week = state.week(PlanId::new(7), 1);
        assert_eq!(week.len(), 2);
        assert_eq!(week[0], changed);
        assert_eq!(week[1].key().exercise_id, ExerciseId::new(2));
    }

    #[test]
    fn restore_none_removes_the_week() {
        let mut state = TrackerState::new();
        let before = state.snapshot_week(PlanId::new(7), 2);
        state.upsert_record(record(1, 2));
        state.restore_week(PlanId::new(7), 2, before);
        assert!(state.is_empty());
    }

    #[test]
    fn json_blob_restores_the_same_state() {
        let mut state = TrackerState::new();
        state.upsert_record(record(1, 1));
        state.upsert_record(record(1, 2));

        let json = state.to_json().unwrap();
        assert!(json.contains("\"weekNumber\":2"));
        assert_eq!(TrackerState::from_json(&json).unwrap(), state);
    }

    #[test]
    fn malformed_blob_is_an_error() {
        assert!(TrackerState::from_json("{not json").is_err());
    }
}
