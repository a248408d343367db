use serde::{Deserialize, Serialize};

/// Completed-set count for one exercise in one week, with its derived done flag.
///
/// `is_exercise_done` is never stored independently of the count: it is
/// always `sets_completed >= total_sets`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCompletion {
    pub sets_completed: u32,
    pub is_exercise_done: bool,
}

impl SetCompletion {
    /// Computes the count after applying `increment` to `current`.
    ///
    /// With `complete_all` the result is `total_sets` regardless of the prior
    /// count. Otherwise the sum is clamped into `[0, total_sets]`.
    #[must_use]
    pub fn compute(current: u32, increment: i64, total_sets: u32, complete_all: bool) -> Self {
        let sets_completed = if complete_all {
            total_sets
        } else {
            let raw = i64::from(current).saturating_add(increment);
            let clamped = raw.clamp(0, i64::from(total_sets));
            u32::try_from(clamped).unwrap_or(total_sets)
        };
        Self::from_count(sets_completed, total_sets)
    }

    /// Clamps an absolute count into `[0, total_sets]` and derives the flag.
    #[must_use]
    pub fn from_count(sets_completed: u32, total_sets: u32) -> Self {
        let sets_completed = sets_completed.min(total_sets);
        Self {
            sets_completed,
            is_exercise_done: sets_completed >= total_sets,
        }
    }
}

/// Position of a record along the completion axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Initialized,
    PartiallyCompleted,
    Done,
}

impl ProgressState {
    #[must_use]
    pub fn of(sets_completed: u32, total_sets: u32) -> Self {
        if sets_completed >= total_sets {
            Self::Done
        } else if sets_completed == 0 {
            Self::Initialized
        } else {
            Self::PartiallyCompleted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_past_total_is_clamped_and_done() {
        let next = SetCompletion::compute(2, 5, 3, false);
        assert_eq!(next.sets_completed, 3);
        assert!(next.is_exercise_done);
    }

    #[test]
    fn negative_increment_floors_at_zero() {
        let next = SetCompletion::compute(1, -4, 3, false);
        assert_eq!(next.sets_completed, 0);
        assert!(!next.is_exercise_done);
    }

    #[test]
    fn clamping_holds_for_extreme_increments() {
        for total in 1..=6_u32 {
            for current in 0..=total {
                for increment in [i64::MIN, -100, -1, 0, 1, 2, 100, i64::MAX] {
                    let next = SetCompletion::compute(current, increment, total, false);
                    assert!(next.sets_completed <= total);
                    assert_eq!(next.is_exercise_done, next.sets_completed >= total);
                }
            }
        }
    }

    #[test]
    fn complete_all_ignores_prior_state_and_increment() {
        for current in [0, 1, 7] {
            let next = SetCompletion::compute(current, -3, 4, true);
            assert_eq!(next.sets_completed, 4);
            assert!(next.is_exercise_done);
        }
    }

    #[test]
    fn from_count_caps_at_total() {
        let c = SetCompletion::from_count(9, 4);
        assert_eq!(c.sets_completed, 4);
        assert!(c.is_exercise_done);
    }

    #[test]
    fn state_follows_count_axis() {
        assert_eq!(ProgressState::of(0, 3), ProgressState::Initialized);
        assert_eq!(ProgressState::of(2, 3), ProgressState::PartiallyCompleted);
        assert_eq!(ProgressState::of(3, 3), ProgressState::Done);
    }
}
