//! Unlock sessions: time-boxed access to blocked apps bought with fruits.
//!
//! Expiry is detected lazily. Nothing here runs on a timer; every read goes
//! through [`BlocklistState::sweep_expired`] first, which deactivates any
//! unlock whose window has passed and hands it back so the caller can
//! reinstate blocking exactly once.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::settings::BlocklistSettings;
use super::tokens::AppTokenSet;
use crate::clock::{local_day_bounds, minutes_to_seconds, seconds_between};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockEndReason {
    Expired,
    EndedEarly,
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockSession {
    pub id: String,
    pub app_tokens: AppTokenSet,
    pub duration_minutes: u32,
    /// Price paid at purchase. Later settings changes never touch it.
    pub cost: u64,
    pub start_time: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<UnlockEndReason>,
}

impl UnlockSession {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.start_time + Duration::seconds(minutes_to_seconds(self.duration_minutes))
    }

    /// Seconds of access left at `now`, floored at zero.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        seconds_between(now, self.expires_at()).max(0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining_secs(now) == 0
    }

    fn end(&mut self, reason: UnlockEndReason, now: DateTime<Utc>) {
        self.is_active = false;
        self.end_reason = Some(reason);
        self.ended_at = Some(match reason {
            UnlockEndReason::Expired => self.expires_at(),
            UnlockEndReason::EndedEarly | UnlockEndReason::Replaced => now,
        });
    }
}

/// An unlock session together with its derived remaining time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockStatus {
    #[serde(flatten)]
    pub session: UnlockSession,
    pub remaining_secs: i64,
    pub expires_at: DateTime<Utc>,
}

impl UnlockStatus {
    pub fn of(session: &UnlockSession, now: DateTime<Utc>) -> Self {
        Self {
            session: session.clone(),
            remaining_secs: if session.is_active {
                session.remaining_secs(now)
            } else {
                0
            },
            expires_at: session.expires_at(),
        }
    }
}

/// Result of a purchase.
#[derive(Debug, Clone)]
pub struct UnlockGrant {
    pub session: UnlockSession,
    /// Active unlocks that overlapped the request and were ended.
    pub replaced: Vec<UnlockSession>,
    /// Tokens of replaced unlocks that are no longer covered and must be
    /// blocked again.
    pub relock: AppTokenSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocklistState {
    #[serde(default)]
    pub settings: BlocklistSettings,
    #[serde(default)]
    pub active_unlock_sessions: Vec<UnlockSession>,
    #[serde(default)]
    pub unlock_history: Vec<UnlockSession>,
}

impl BlocklistState {
    pub fn with_settings(settings: BlocklistSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Deactivate every unlock whose window has passed and return them.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<UnlockSession> {
        let (expired, active): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active_unlock_sessions)
            .into_iter()
            .partition(|u| u.is_expired(now));
        self.active_unlock_sessions = active;

        expired
            .into_iter()
            .map(|mut unlock| {
                unlock.end(UnlockEndReason::Expired, now);
                self.unlock_history.push(unlock.clone());
                unlock
            })
            .collect()
    }

    pub fn active(&self) -> &[UnlockSession] {
        &self.active_unlock_sessions
    }

    pub fn find(&self, id: &str) -> Option<&UnlockSession> {
        self.active_unlock_sessions
            .iter()
            .chain(self.unlock_history.iter())
            .find(|u| u.id == id)
    }

    /// Purchases (active or ended) started in the local day containing `now`.
    pub fn purchases_today(&self, now: DateTime<Utc>, offset: FixedOffset) -> usize {
        let (start, end) = local_day_bounds(now, offset);
        self.active_unlock_sessions
            .iter()
            .chain(self.unlock_history.iter())
            .filter(|u| u.start_time >= start && u.start_time < end)
            .count()
    }

    pub fn remaining_unlocks_today(&self, now: DateTime<Utc>, offset: FixedOffset) -> u32 {
        let used = u32::try_from(self.purchases_today(now, offset)).unwrap_or(u32::MAX);
        self.settings.allowed_unlocks_per_day.saturating_sub(used)
    }

    pub fn cost_of(&self, duration_minutes: u32) -> u64 {
        u64::from(duration_minutes) * u64::from(self.settings.unlock_cost_per_minute)
    }

    /// Validate a purchase against settings, quota and balance, in that
    /// order. Returns the cost.
    pub fn check_request(
        &self,
        app_tokens: &AppTokenSet,
        duration_minutes: u32,
        balance: u64,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<u64, EngineError> {
        if app_tokens.is_empty() {
            return Err(EngineError::EmptyTokenSet);
        }
        if !self.settings.is_enabled {
            return Err(EngineError::BlockingDisabled);
        }
        let max = self.settings.max_unlock_duration;
        if duration_minutes == 0 || duration_minutes > max {
            return Err(EngineError::InvalidDuration {
                requested: duration_minutes,
                max,
            });
        }
        if self.remaining_unlocks_today(now, offset) == 0 {
            return Err(EngineError::DailyLimitReached {
                allowed: self.settings.allowed_unlocks_per_day,
            });
        }
        let cost = self.cost_of(duration_minutes);
        if cost > balance {
            return Err(EngineError::InsufficientBalance {
                requested: cost,
                balance,
            });
        }
        Ok(cost)
    }

    /// Record a paid unlock. Overlapping active unlocks are replaced.
    pub fn grant(
        &mut self,
        app_tokens: AppTokenSet,
        duration_minutes: u32,
        cost: u64,
        now: DateTime<Utc>,
    ) -> UnlockGrant {
        let (replaced, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active_unlock_sessions)
            .into_iter()
            .partition(|u| u.app_tokens.overlaps(&app_tokens));
        self.active_unlock_sessions = kept;

        let mut relock = AppTokenSet::default();
        let replaced: Vec<UnlockSession> = replaced
            .into_iter()
            .map(|mut old| {
                relock = relock.union(&old.app_tokens);
                old.end(UnlockEndReason::Replaced, now);
                self.unlock_history.push(old.clone());
                old
            })
            .collect();
        let relock = self.uncovered(&relock.difference(&app_tokens));

        let session = UnlockSession {
            id: uuid::Uuid::new_v4().to_string(),
            app_tokens,
            duration_minutes,
            cost,
            start_time: now,
            is_active: true,
            ended_at: None,
            end_reason: None,
        };
        self.active_unlock_sessions.push(session.clone());

        UnlockGrant {
            session,
            replaced,
            relock,
        }
    }

    /// End an active unlock before its window closes. No refund.
    pub fn end_early(&mut self, id: &str, now: DateTime<Utc>) -> Result<UnlockSession, EngineError> {
        let Some(pos) = self.active_unlock_sessions.iter().position(|u| u.id == id) else {
            return Err(if self.unlock_history.iter().any(|u| u.id == id) {
                EngineError::UnlockNotActive(id.to_string())
            } else {
                EngineError::UnknownUnlockSession(id.to_string())
            });
        };
        let mut unlock = self.active_unlock_sessions.remove(pos);
        unlock.end(UnlockEndReason::EndedEarly, now);
        self.unlock_history.push(unlock.clone());
        Ok(unlock)
    }

    /// Tokens of `tokens` not covered by any remaining active unlock.
    pub fn uncovered(&self, tokens: &AppTokenSet) -> AppTokenSet {
        self.active_unlock_sessions
            .iter()
            .fold(tokens.clone(), |acc, u| acc.difference(&u.app_tokens))
    }

    /// Drop ended unlocks that started more than `keep_days` ago.
    pub fn prune_history(&mut self, now: DateTime<Utc>, keep_days: u32) -> usize {
        let cutoff = now - Duration::days(i64::from(keep_days));
        let before = self.unlock_history.len();
        self.unlock_history.retain(|u| u.start_time >= cutoff);
        before - self.unlock_history.len()
    }

    pub fn statuses(&self, now: DateTime<Utc>) -> Vec<UnlockStatus> {
        self.active_unlock_sessions
            .iter()
            .map(|u| UnlockStatus::of(u, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Offset, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn utc() -> FixedOffset {
        Utc.fix()
    }

    fn tokens(names: &[&str]) -> AppTokenSet {
        AppTokenSet::new(names.iter().copied())
    }

    #[test]
    fn request_checks_in_order() {
        let mut state = BlocklistState::default();
        state.settings.max_unlock_duration = 30;
        state.settings.unlock_cost_per_minute = 2;

        assert_eq!(
            state.check_request(&tokens(&[]), 10, 100, t0(), utc()),
            Err(EngineError::EmptyTokenSet)
        );
        assert_eq!(
            state.check_request(&tokens(&["a"]), 45, 100, t0(), utc()),
            Err(EngineError::InvalidDuration {
                requested: 45,
                max: 30
            })
        );
        assert_eq!(
            state.check_request(&tokens(&["a"]), 0, 100, t0(), utc()),
            Err(EngineError::InvalidDuration {
                requested: 0,
                max: 30
            })
        );
        assert_eq!(
            state.check_request(&tokens(&["a"]), 15, 29, t0(), utc()),
            Err(EngineError::InsufficientBalance {
                requested: 30,
                balance: 29
            })
        );
        assert_eq!(state.check_request(&tokens(&["a"]), 15, 40, t0(), utc()), Ok(30));

        state.settings.is_enabled = false;
        assert_eq!(
            state.check_request(&tokens(&["a"]), 15, 40, t0(), utc()),
            Err(EngineError::BlockingDisabled)
        );
    }

    #[test]
    fn quota_counts_todays_purchases_only() {
        let mut state = BlocklistState::default();
        state.settings.allowed_unlocks_per_day = 2;
        state.grant(tokens(&["a"]), 5, 5, t0() - Duration::days(1));
        state.sweep_expired(t0());
        assert_eq!(state.remaining_unlocks_today(t0(), utc()), 2);

        state.grant(tokens(&["a"]), 5, 5, t0());
        state.grant(tokens(&["b"]), 5, 5, t0());
        assert_eq!(state.remaining_unlocks_today(t0(), utc()), 0);
        assert_eq!(
            state.check_request(&tokens(&["c"]), 5, 1_000, t0(), utc()),
            Err(EngineError::DailyLimitReached { allowed: 2 })
        );
    }

    #[test]
    fn sweep_deactivates_once() {
        let mut state = BlocklistState::default();
        let grant = state.grant(tokens(&["a"]), 1, 1, t0());
        assert!(state.sweep_expired(t0() + Duration::seconds(59)).is_empty());

        let expired = state.sweep_expired(t0() + Duration::seconds(61));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, grant.session.id);
        assert!(!expired[0].is_active);
        assert_eq!(expired[0].end_reason, Some(UnlockEndReason::Expired));
        assert_eq!(expired[0].ended_at, Some(t0() + Duration::seconds(60)));

        assert!(state.sweep_expired(t0() + Duration::seconds(120)).is_empty());
        assert!(state.active().is_empty());
        assert!(!state.find(&grant.session.id).unwrap().is_active);
    }

    #[test]
    fn overlapping_grant_replaces_and_relocks_leftovers() {
        let mut state = BlocklistState::default();
        let first = state.grant(tokens(&["a", "b"]), 10, 10, t0());
        let other = state.grant(tokens(&["z"]), 10, 10, t0());
        let second = state.grant(tokens(&["b", "c"]), 10, 10, t0() + Duration::minutes(2));

        assert_eq!(second.replaced.len(), 1);
        assert_eq!(second.replaced[0].id, first.session.id);
        assert_eq!(second.replaced[0].end_reason, Some(UnlockEndReason::Replaced));
        assert_eq!(second.relock, tokens(&["a"]));

        let active_ids: Vec<_> = state.active().iter().map(|u| u.id.clone()).collect();
        assert_eq!(active_ids, vec![other.session.id, second.session.id]);
    }

    #[test]
    fn end_early_distinguishes_unknown_and_ended() {
        let mut state = BlocklistState::default();
        let grant = state.grant(tokens(&["a"]), 10, 10, t0());
        let ended = state.end_early(&grant.session.id, t0() + Duration::minutes(3)).unwrap();
        assert_eq!(ended.end_reason, Some(UnlockEndReason::EndedEarly));
        assert_eq!(ended.cost, 10);

        assert_eq!(
            state.end_early(&grant.session.id, t0()),
            Err(EngineError::UnlockNotActive(grant.session.id.clone()))
        );
        assert_eq!(
            state.end_early("nope", t0()),
            Err(EngineError::UnknownUnlockSession("nope".into()))
        );
    }

    #[test]
    fn remaining_time_is_derived() {
        let mut state = BlocklistState::default();
        let grant = state.grant(tokens(&["a"]), 15, 15, t0());
        let status = UnlockStatus::of(&grant.session, t0() + Duration::minutes(10));
        assert_eq!(status.remaining_secs, 5 * 60);
        assert_eq!(status.expires_at, t0() + Duration::minutes(15));
        assert_eq!(grant.session.remaining_secs(t0() + Duration::hours(1)), 0);
    }

    #[test]
    fn history_pruning() {
        let mut state = BlocklistState::default();
        state.grant(tokens(&["a"]), 5, 5, t0() - Duration::days(40));
        state.grant(tokens(&["b"]), 5, 5, t0() - Duration::days(2));
        state.sweep_expired(t0());
        assert_eq!(state.unlock_history.len(), 2);
        assert_eq!(state.prune_history(t0(), 30), 1);
        assert_eq!(state.unlock_history.len(), 1);
    }

    #[test]
    fn status_serializes_flat() {
        let mut state = BlocklistState::default();
        let grant = state.grant(tokens(&["a"]), 5, 5, t0());
        let json = serde_json::to_value(UnlockStatus::of(&grant.session, t0())).unwrap();
        assert_eq!(json["durationMinutes"], 5);
        assert_eq!(json["remainingSecs"], 300);
        assert_eq!(json["appTokens"], serde_json::json!(["a"]));
    }
}
