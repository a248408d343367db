use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Days between the first and last day of a training week.
const WEEK_SPAN_DAYS: i64 = 6;

/// Start and end of a training week (`end` is six days after `start`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WeekWindow {
    #[must_use]
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: add_days(start, WEEK_SPAN_DAYS),
        }
    }

    /// Window of week `week_number` (1-based) for a plan that starts at `plan_start`.
    #[must_use]
    pub fn for_plan_week(plan_start: DateTime<Utc>, week_number: u32) -> Self {
        let offset = i64::from(week_number.saturating_sub(1)) * 7;
        Self::starting_at(add_days(plan_start, offset))
    }
}

fn add_days(at: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    at.checked_add_signed(Duration::days(days))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn window_spans_six_days() {
        let w = WeekWindow::starting_at(fixed_now());
        assert_eq!(w.end - w.start, Duration::days(6));
    }

    #[test]
    fn plan_weeks_are_consecutive() {
        let week1 = WeekWindow::for_plan_week(fixed_now(), 1);
        let week3 = WeekWindow::for_plan_week(fixed_now(), 3);
        assert_eq!(week1.start, fixed_now());
        assert_eq!(week3.start, fixed_now() + Duration::days(14));
        assert_eq!(week3.end, fixed_now() + Duration::days(20));
    }
}
