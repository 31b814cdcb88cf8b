//! Focus session state machine.
//!
//! ## State Transitions
//!
//! ```text
//! Scheduled -> Active <-> Paused -> (Completed | Cancelled)
//! ```
//!
//! There is at most one current session. Finished sessions move into the
//! history and are never touched again. The machine knows nothing about
//! rewards: completion hands the finished session back and the engine
//! credits the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::{FocusSession, PauseInterval, SessionStatus};
use super::timing;
use crate::clock::round_seconds_to_minutes;
use crate::error::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusState {
    #[serde(default)]
    pub current_session: Option<FocusSession>,
    #[serde(default)]
    pub sessions: Vec<FocusSession>,
}

impl FocusState {
    // ── Queries ──────────────────────────────────────────────────────

    pub fn current(&self) -> Option<&FocusSession> {
        self.current_session.as_ref()
    }

    pub fn history(&self) -> &[FocusSession] {
        &self.sessions
    }

    pub fn find(&self, id: &str) -> Option<&FocusSession> {
        self.current()
            .filter(|s| s.id == id)
            .or_else(|| self.sessions.iter().find(|s| s.id == id))
    }

    /// Completed sessions whose end time falls in `[from, to)`.
    pub fn completed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Iterator<Item = &FocusSession> {
        self.sessions.iter().filter(move |s| {
            s.status == SessionStatus::Completed
                && s.end_time.is_some_and(|end| end >= from && end < to)
        })
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(
        &mut self,
        target_duration: u32,
        tag_id: Option<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&FocusSession, EngineError> {
        self.ensure_slot_free()?;
        let session = FocusSession::new(
            SessionStatus::Active,
            now,
            target_duration,
            tag_id,
            description,
            now,
        );
        Ok(&*self.current_session.insert(session))
    }

    /// Plan a session for later. It occupies the current slot until it is
    /// begun or cancelled.
    pub fn schedule(
        &mut self,
        start_at: DateTime<Utc>,
        target_duration: u32,
        tag_id: Option<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&FocusSession, EngineError> {
        self.ensure_slot_free()?;
        let session = FocusSession::new(
            SessionStatus::Scheduled,
            start_at,
            target_duration,
            tag_id,
            description,
            now,
        );
        Ok(&*self.current_session.insert(session))
    }

    pub fn begin_scheduled(&mut self, now: DateTime<Utc>) -> Result<&FocusSession, EngineError> {
        let session = self.current_mut_in(SessionStatus::Scheduled, "begin")?;
        session.status = SessionStatus::Active;
        session.start_time = now;
        session.updated_at = now;
        Ok(&*session)
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<&FocusSession, EngineError> {
        let session = self.current_mut_in(SessionStatus::Active, "pause")?;
        session.pause_history.push(PauseInterval::open(now));
        session.status = SessionStatus::Paused;
        session.updated_at = now;
        Ok(&*session)
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<&FocusSession, EngineError> {
        let session = self.current_mut_in(SessionStatus::Paused, "resume")?;
        session.close_open_pause(now);
        session.status = SessionStatus::Active;
        session.updated_at = now;
        Ok(&*session)
    }

    /// Finish the current session on user request.
    ///
    /// `duration` is the reconstructed elapsed time rounded to minutes.
    pub fn complete(
        &mut self,
        minutes_per_fruit: u32,
        now: DateTime<Utc>,
    ) -> Result<FocusSession, EngineError> {
        let session = self.take_running("complete")?;
        Ok(self.finish(session, SessionStatus::Completed, minutes_per_fruit, now))
    }

    /// Finish an overdue countdown as if it ended exactly on time.
    ///
    /// Returns `None` when nothing is due.
    pub fn auto_complete(
        &mut self,
        minutes_per_fruit: u32,
        now: DateTime<Utc>,
    ) -> Option<FocusSession> {
        let due = self
            .current()
            .is_some_and(|s| timing::should_auto_complete(s, now));
        if !due {
            return None;
        }
        let mut session = self.current_session.take()?;

        let finish = timing::scheduled_finish(&session);
        session.status = SessionStatus::Completed;
        session.end_time = Some(finish.min(now).max(session.start_time));
        session.duration = session.target_duration;
        session.fruits_earned = fruits_for(session.duration, minutes_per_fruit);
        session.updated_at = now;

        self.sessions.push(session.clone());
        Some(session)
    }

    /// Abandon the current session. Nothing is credited.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<FocusSession, EngineError> {
        let session = match self.current_session.take() {
            Some(s) if s.status == SessionStatus::Scheduled => {
                let mut s = s;
                s.status = SessionStatus::Cancelled;
                s.end_time = Some(now.max(s.start_time));
                s.updated_at = now;
                self.sessions.push(s.clone());
                return Ok(s);
            }
            Some(s) if s.status.is_running() => s,
            Some(s) => {
                let status = s.status;
                self.current_session = Some(s);
                return Err(EngineError::InvalidTransition {
                    status,
                    action: "cancel",
                });
            }
            None => return Err(EngineError::NoActiveSession),
        };
        Ok(self.finish(session, SessionStatus::Cancelled, 0, now))
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn ensure_slot_free(&self) -> Result<(), EngineError> {
        match self.current() {
            Some(existing) => Err(EngineError::SessionInProgress {
                id: existing.id.clone(),
            }),
            None => Ok(()),
        }
    }

    fn current_mut_in(
        &mut self,
        expected: SessionStatus,
        action: &'static str,
    ) -> Result<&mut FocusSession, EngineError> {
        let session = self
            .current_session
            .as_mut()
            .ok_or(EngineError::NoActiveSession)?;
        if session.status != expected {
            return Err(EngineError::InvalidTransition {
                status: session.status,
                action,
            });
        }
        Ok(session)
    }

    fn take_running(&mut self, action: &'static str) -> Result<FocusSession, EngineError> {
        match self.current_session.take() {
            Some(s) if s.status.is_running() => Ok(s),
            Some(s) => {
                let status = s.status;
                self.current_session = Some(s);
                Err(EngineError::InvalidTransition { status, action })
            }
            None => Err(EngineError::NoActiveSession),
        }
    }

    fn finish(
        &mut self,
        mut session: FocusSession,
        outcome: SessionStatus,
        minutes_per_fruit: u32,
        now: DateTime<Utc>,
    ) -> FocusSession {
        session.close_open_pause(now);
        // Reconstruct while still running so the interval up to `now` counts.
        session.status = SessionStatus::Active;
        let elapsed = timing::reconstruct(&session, now).elapsed_secs;

        session.status = outcome;
        session.end_time = Some(now.max(session.start_time));
        session.duration = round_seconds_to_minutes(elapsed);
        session.fruits_earned = if outcome == SessionStatus::Completed {
            fruits_for(session.duration, minutes_per_fruit)
        } else {
            0
        };
        session.updated_at = now;

        self.sessions.push(session.clone());
        session
    }
}

/// Whole fruits earned for `minutes` of focus.
pub fn fruits_for(minutes: u32, minutes_per_fruit: u32) -> u64 {
    if minutes_per_fruit == 0 {
        return 0;
    }
    u64::from(minutes / minutes_per_fruit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn mins(m: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(m)
    }

    #[test]
    fn start_pause_resume_complete() {
        let mut focus = FocusState::default();
        focus.start(25, Some("work".into()), None, t0()).unwrap();
        assert_eq!(focus.current().unwrap().status, SessionStatus::Active);

        focus.pause(mins(5)).unwrap();
        assert_eq!(focus.current().unwrap().status, SessionStatus::Paused);
        assert!(focus.current().unwrap().open_pause().is_some());

        focus.resume(mins(8)).unwrap();
        let current = focus.current().unwrap();
        assert_eq!(current.status, SessionStatus::Active);
        assert_eq!(current.pause_history[0].end_time, Some(mins(8)));

        let done = focus.complete(5, mins(26)).unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.duration, 23);
        assert_eq!(done.fruits_earned, 4);
        assert_eq!(done.end_time, Some(mins(26)));
        assert!(focus.current().is_none());
        assert_eq!(focus.history().len(), 1);
    }

    #[test]
    fn only_one_current_session() {
        let mut focus = FocusState::default();
        focus.start(25, None, None, t0()).unwrap();
        let err = focus.start(25, None, None, t0()).unwrap_err();
        assert!(matches!(err, EngineError::SessionInProgress { .. }));

        focus.pause(mins(1)).unwrap();
        assert!(focus.start(25, None, None, mins(2)).is_err());
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut focus = FocusState::default();
        assert_eq!(focus.pause(t0()).unwrap_err(), EngineError::NoActiveSession);

        focus.start(25, None, None, t0()).unwrap();
        assert_eq!(
            focus.resume(mins(1)).unwrap_err(),
            EngineError::InvalidTransition {
                status: SessionStatus::Active,
                action: "resume"
            }
        );
        focus.pause(mins(1)).unwrap();
        assert!(focus.pause(mins(2)).is_err());
        // The failed call left the session untouched.
        assert_eq!(focus.current().unwrap().pause_history.len(), 1);
    }

    #[test]
    fn completing_while_paused_closes_the_pause() {
        let mut focus = FocusState::default();
        focus.start(25, None, None, t0()).unwrap();
        focus.pause(mins(10)).unwrap();
        let done = focus.complete(5, mins(30)).unwrap();
        assert_eq!(done.pause_history[0].end_time, Some(mins(30)));
        assert_eq!(done.duration, 10);
        assert_eq!(done.fruits_earned, 2);
        assert!(done.invariant_violations().is_empty());
    }

    #[test]
    fn complete_twice_is_rejected() {
        let mut focus = FocusState::default();
        focus.start(25, None, None, t0()).unwrap();
        focus.complete(5, mins(25)).unwrap();
        assert_eq!(
            focus.complete(5, mins(26)).unwrap_err(),
            EngineError::NoActiveSession
        );
        assert_eq!(focus.history().len(), 1);
    }

    #[test]
    fn cancel_records_duration_without_fruits() {
        let mut focus = FocusState::default();
        focus.start(25, None, None, t0()).unwrap();
        let cancelled = focus.cancel(mins(12)).unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        assert_eq!(cancelled.duration, 12);
        assert_eq!(cancelled.fruits_earned, 0);
        assert!(cancelled.end_time.is_some());
    }

    #[test]
    fn auto_complete_credits_planned_duration() {
        let mut focus = FocusState::default();
        focus.start(25, None, None, t0()).unwrap();
        assert!(focus.auto_complete(5, mins(20)).is_none());

        let done = focus.auto_complete(5, mins(30)).unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.duration, 25);
        assert_eq!(done.fruits_earned, 5);
        assert_eq!(done.end_time, Some(mins(25)));
        assert!(focus.current().is_none());
    }

    #[test]
    fn paused_session_is_not_auto_completed() {
        let mut focus = FocusState::default();
        focus.start(25, None, None, t0()).unwrap();
        focus.pause(mins(3)).unwrap();
        assert!(focus.auto_complete(5, mins(600)).is_none());
        assert_eq!(focus.current().unwrap().status, SessionStatus::Paused);
    }

    #[test]
    fn scheduled_session_lifecycle() {
        let mut focus = FocusState::default();
        focus.schedule(mins(60), 50, None, None, t0()).unwrap();
        assert_eq!(focus.current().unwrap().status, SessionStatus::Scheduled);
        assert!(focus.pause(mins(1)).is_err());
        assert!(focus.complete(5, mins(1)).is_err());
        assert_eq!(focus.current().unwrap().status, SessionStatus::Scheduled);

        let begun = focus.begin_scheduled(mins(61)).unwrap();
        assert_eq!(begun.status, SessionStatus::Active);
        assert_eq!(begun.start_time, mins(61));

        let mut other = FocusState::default();
        other.schedule(mins(60), 50, None, None, t0()).unwrap();
        let cancelled = other.cancel(mins(5)).unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        assert_eq!(cancelled.duration, 0);
        assert!(cancelled.invariant_violations().is_empty());
    }

    #[test]
    fn open_ended_session_completes_with_elapsed() {
        let mut focus = FocusState::default();
        focus.start(0, None, None, t0()).unwrap();
        assert!(focus.auto_complete(5, mins(500)).is_none());
        let done = focus.complete(5, mins(47)).unwrap();
        assert_eq!(done.duration, 47);
        assert_eq!(done.fruits_earned, 9);
    }
}
