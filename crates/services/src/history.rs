use std::collections::{BTreeMap, HashMap};

use training_core::model::{ExerciseId, WeeklyProgress};

/// Totals for one week of a plan, one point on a history chart.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WeekSummary {
    pub week_number: u32,
    pub sets_completed: u32,
    /// Sum of planned sets for the exercises tracked this week.
    /// Exercises without a known total contribute nothing.
    pub sets_planned: u32,
    pub exercises_done: u32,
    pub exercises_tracked: u32,
}

impl WeekSummary {
    /// Share of planned sets completed, in percent (0 when nothing is planned).
    #[must_use]
    pub fn completion_percent(&self) -> u32 {
        if self.sets_planned == 0 {
            return 0;
        }
        let done = u64::from(self.sets_completed.min(self.sets_planned));
        let pct = done * 100 / u64::from(self.sets_planned);
        u32::try_from(pct).unwrap_or(100)
    }
}

/// Group records by week, in ascending week order.
pub(crate) fn summarize_weeks(
    records: &[WeeklyProgress],
    total_sets: &HashMap<ExerciseId, u32>,
) -> Vec<WeekSummary> {
    let mut weeks: BTreeMap<u32, WeekSummary> = BTreeMap::new();
    for record in records {
        let key = record.key();
        let week = weeks.entry(key.week_number).or_insert_with(|| WeekSummary {
            week_number: key.week_number,
            ..WeekSummary::default()
        });
        week.sets_completed = week.sets_completed.saturating_add(record.sets_completed());
        week.exercises_tracked += 1;
        if let Some(total) = total_sets.get(&key.exercise_id) {
            week.sets_planned = week.sets_planned.saturating_add(*total);
        }
        if record.is_exercise_done() {
            week.exercises_done += 1;
        }
    }
    weeks.into_values().collect()
}
