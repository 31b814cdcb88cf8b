//! Session timing reconstruction.
//!
//! Elapsed and remaining time are never tracked with a running counter. They
//! are recomputed from the absolute start timestamp and the pause history,
//! so the result is identical whether the process ran continuously, was
//! suspended, or was killed and relaunched.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::session::{FocusSession, SessionStatus};
use crate::clock::{minutes_to_seconds, seconds_between};

/// Timing of a session as of `at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTiming {
    pub at: DateTime<Utc>,
    pub elapsed_secs: i64,
    pub total_pause_secs: i64,
    /// `None` for open-ended sessions. Negative once a countdown overshoots.
    pub remaining_secs: Option<i64>,
}

impl SessionTiming {
    pub fn is_overdue(&self) -> bool {
        matches!(self.remaining_secs, Some(r) if r <= 0)
    }

    /// Remaining time for display, never negative.
    pub fn display_remaining_secs(&self) -> Option<i64> {
        self.remaining_secs.map(|r| r.max(0))
    }
}

/// Closed pauses, plus the open pause up to `now` while the session is paused.
pub fn total_pause_secs(session: &FocusSession, now: DateTime<Utc>) -> i64 {
    session
        .pause_history
        .iter()
        .map(|pause| match pause.end_time {
            Some(end) => seconds_between(pause.start_time, end).max(0),
            None if session.status == SessionStatus::Paused => {
                seconds_between(pause.start_time, now).max(0)
            }
            None => 0,
        })
        .sum()
}

/// Reconstruct elapsed/remaining time at `now`.
///
/// Terminal sessions are evaluated at their `end_time`, scheduled sessions
/// have not accumulated any time yet.
pub fn reconstruct(session: &FocusSession, now: DateTime<Utc>) -> SessionTiming {
    let at = match (session.status, session.end_time) {
        (status, Some(end)) if status.is_terminal() => end,
        _ => now,
    };

    let (elapsed_secs, total_pause_secs) = if session.status == SessionStatus::Scheduled {
        (0, 0)
    } else {
        let pauses = total_pause_secs(session, at);
        let wall = seconds_between(session.start_time, at);
        ((wall - pauses).max(0), pauses)
    };

    let remaining_secs = if session.is_open_ended() {
        None
    } else {
        Some(minutes_to_seconds(session.target_duration) - elapsed_secs)
    };

    SessionTiming {
        at,
        elapsed_secs,
        total_pause_secs,
        remaining_secs,
    }
}

/// An active countdown whose remaining time has run out.
///
/// Paused sessions are never auto-completed; they stay paused until the
/// user acts.
pub fn should_auto_complete(session: &FocusSession, now: DateTime<Utc>) -> bool {
    session.status == SessionStatus::Active
        && !session.is_open_ended()
        && reconstruct(session, now).is_overdue()
}

/// The instant the countdown reached zero: start + target + closed pauses.
pub fn scheduled_finish(session: &FocusSession) -> DateTime<Utc> {
    let closed_pauses: i64 = session
        .pause_history
        .iter()
        .filter_map(|p| p.end_time.map(|end| seconds_between(p.start_time, end).max(0)))
        .sum();
    session.start_time
        + Duration::seconds(minutes_to_seconds(session.target_duration) + closed_pauses)
}
