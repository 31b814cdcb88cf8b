//! Daily focus streaks and the streak bonus.
//!
//! A streak is the run of consecutive local calendar days, ending on the day
//! being evaluated, with at least one completed focus session.

use std::collections::BTreeSet;

use chrono::{Days, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::focus::{FocusSession, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakPolicy {
    /// Fruits credited when a streak reaches a milestone. `0` disables it.
    pub bonus_fruits: u64,
    /// Milestone spacing in days.
    pub interval_days: u32,
}

impl Default for StreakPolicy {
    fn default() -> Self {
        Self {
            bonus_fruits: 5,
            interval_days: 7,
        }
    }
}

fn completed_days(sessions: &[FocusSession], offset: FixedOffset) -> BTreeSet<NaiveDate> {
    sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Completed)
        .filter_map(|s| s.end_time)
        .map(|end| end.with_timezone(&offset).date_naive())
        .collect()
}

/// Length of the streak ending on `day`.
pub fn streak_ending_on(sessions: &[FocusSession], day: NaiveDate, offset: FixedOffset) -> u32 {
    let days = completed_days(sessions, offset);
    let mut streak = 0;
    let mut cursor = Some(day);
    while let Some(d) = cursor.filter(|d| days.contains(d)) {
        streak += 1;
        cursor = d.checked_sub_days(Days::new(1));
    }
    streak
}

/// Streak length if `completed` earns a bonus, given the history that
/// already contains it.
///
/// Only the first completion of a day can trigger the bonus, so completing
/// several sessions on a milestone day pays out once.
pub fn bonus_due(
    history: &[FocusSession],
    completed: &FocusSession,
    offset: FixedOffset,
    policy: &StreakPolicy,
) -> Option<u32> {
    if policy.bonus_fruits == 0 || policy.interval_days == 0 {
        return None;
    }
    let day = completed.end_time?.with_timezone(&offset).date_naive();

    let completions_today = history
        .iter()
        .filter(|s| s.status == SessionStatus::Completed)
        .filter_map(|s| s.end_time)
        .filter(|end| end.with_timezone(&offset).date_naive() == day)
        .count();
    if completions_today != 1 {
        return None;
    }

    let streak = streak_ending_on(history, day, offset);
    (streak > 0 && streak % policy.interval_days == 0).then_some(streak)
}
