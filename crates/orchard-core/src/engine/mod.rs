//! The engine: explicit state plus transitions.
//!
//! Every public operation works on a scratch copy of [`EngineState`] and
//! commits it only when the whole operation succeeds, so a rejected request
//! leaves no partial change of its own. Side effects are returned as
//! [`Effect`]s for the host to carry out; the engine itself never touches
//! storage or the OS.
//!
//! Before acting, each operation reconciles lazily detected state: an
//! overdue countdown is auto-completed and expired unlocks are ended. That
//! makes correctness independent of any periodic tick. Reconciliation is a
//! read side effect and stays committed even when the operation that
//! observed it is rejected.

mod effect;
mod state;

pub use effect::{Effect, Transition};
pub use state::{EngineConfig, EngineState};

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use serde_json::json;

use crate::blocklist::{
    AppTokenSet, BlocklistSettings, SettingsAdjustment, UnlockEndReason, UnlockSession,
    UnlockStatus,
};
use crate::clock::Clock;
use crate::error::EngineError;
use crate::events::Event;
use crate::focus::{timing, FocusSession, SessionTiming};
use crate::rewards::{streak, Metadata, RewardSource, RewardTransaction};

/// What reconciliation found and settled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciled {
    /// The session that was auto-completed, if one was overdue.
    pub completed: Option<FocusSession>,
    /// Unlocks whose window had closed.
    pub expired: Vec<UnlockSession>,
}

impl Reconciled {
    pub fn is_empty(&self) -> bool {
        self.completed.is_none() && self.expired.is_empty()
    }
}

/// Snapshot for a UI refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickStatus {
    pub focus: Option<SessionTiming>,
    pub unlocks: Vec<UnlockStatus>,
    pub balance: u64,
    pub remaining_unlocks_today: u32,
}

pub struct Engine<C> {
    state: EngineState,
    config: EngineConfig,
    clock: C,
    settled: Settled,
}

impl<C: Clock> Engine<C> {
    pub fn new(state: EngineState, config: EngineConfig, clock: C) -> Self {
        Self {
            state,
            config,
            clock,
            settled: Settled::default(),
        }
    }

    /// An engine over a fresh state built from `config`'s default settings.
    pub fn fresh(config: EngineConfig, clock: C) -> Self {
        let state = EngineState::with_settings(config.default_settings);
        Self::new(state, config, clock)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn into_state(self) -> EngineState {
        self.state
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn balance(&self) -> u64 {
        self.state.rewards.balance()
    }

    pub fn current_session(&self) -> Option<&FocusSession> {
        self.state.focus.current()
    }

    /// Elapsed and remaining time of the current session, rebuilt from its
    /// timestamps. Pure: nothing is auto-completed.
    pub fn focus_timing(&self) -> Option<SessionTiming> {
        let now = self.clock.now();
        self.state
            .focus
            .current()
            .map(|s| timing::reconstruct(s, now))
    }

    // ── Focus commands ───────────────────────────────────────────────

    pub fn start_focus(
        &mut self,
        target_minutes: u32,
        tag_id: Option<String>,
        description: Option<String>,
    ) -> Result<Transition<FocusSession>, EngineError> {
        self.transact(|tx| {
            let session = tx
                .state
                .focus
                .start(target_minutes, tag_id, description, tx.now)?
                .clone();
            tx.emit(Event::FocusStarted {
                session_id: session.id.clone(),
                target_minutes,
                at: tx.now,
            });
            Ok(session)
        })
    }

    pub fn schedule_focus(
        &mut self,
        start_at: DateTime<Utc>,
        target_minutes: u32,
        tag_id: Option<String>,
        description: Option<String>,
    ) -> Result<Transition<FocusSession>, EngineError> {
        self.transact(|tx| {
            let session = tx
                .state
                .focus
                .schedule(start_at, target_minutes, tag_id, description, tx.now)?
                .clone();
            tx.emit(Event::FocusScheduled {
                session_id: session.id.clone(),
                start_at,
                at: tx.now,
            });
            Ok(session)
        })
    }

    pub fn begin_scheduled(&mut self) -> Result<Transition<FocusSession>, EngineError> {
        self.transact(|tx| {
            let session = tx.state.focus.begin_scheduled(tx.now)?.clone();
            tx.emit(Event::FocusStarted {
                session_id: session.id.clone(),
                target_minutes: session.target_duration,
                at: tx.now,
            });
            Ok(session)
        })
    }

    pub fn pause_focus(&mut self) -> Result<Transition<FocusSession>, EngineError> {
        self.transact(|tx| {
            let session = tx.state.focus.pause(tx.now)?.clone();
            tx.emit(Event::FocusPaused {
                session_id: session.id.clone(),
                elapsed_secs: timing::reconstruct(&session, tx.now).elapsed_secs,
                at: tx.now,
            });
            Ok(session)
        })
    }

    pub fn resume_focus(&mut self) -> Result<Transition<FocusSession>, EngineError> {
        self.transact(|tx| {
            let session = tx.state.focus.resume(tx.now)?.clone();
            tx.emit(Event::FocusResumed {
                session_id: session.id.clone(),
                elapsed_secs: timing::reconstruct(&session, tx.now).elapsed_secs,
                at: tx.now,
            });
            Ok(session)
        })
    }

    /// Finish the current session and credit its fruits.
    ///
    /// A countdown that already ran out is settled by reconciliation as an
    /// on-time completion, and that session is returned instead.
    pub fn complete_focus(&mut self) -> Result<Transition<FocusSession>, EngineError> {
        self.transact(|tx| {
            if let Some(session) = tx.reconciled.completed.clone() {
                return Ok(session);
            }
            let session = tx
                .state
                .focus
                .complete(tx.config.minutes_per_fruit, tx.now)?;
            tx.settle_completion(&session, false)?;
            Ok(session)
        })
    }

    pub fn cancel_focus(&mut self) -> Result<Transition<FocusSession>, EngineError> {
        self.transact(|tx| {
            let session = tx.state.focus.cancel(tx.now)?;
            tx.emit(Event::FocusCancelled {
                session_id: session.id.clone(),
                duration_minutes: session.duration,
                at: tx.now,
            });
            Ok(session)
        })
    }

    /// Settle everything that became due while nobody was looking.
    /// Run on cold start.
    pub fn reconcile(&mut self) -> Result<Transition<Reconciled>, EngineError> {
        self.transact(|tx| Ok(tx.take_reconciled()))
    }

    /// Events and effects of reconciliation done by rejected operations.
    ///
    /// The state change is already committed; the host carries these out
    /// right after the rejection. Ends with `Persist` when non-empty.
    pub fn take_settled(&mut self) -> Transition<()> {
        let Settled {
            events,
            mut effects,
        } = std::mem::take(&mut self.settled);
        if !events.is_empty() || !effects.is_empty() {
            effects.push(Effect::Persist);
        }
        Transition {
            value: (),
            events,
            effects,
        }
    }

    /// The 1 Hz UI refresh: reconcile, then report.
    pub fn tick(&mut self) -> Result<Transition<TickStatus>, EngineError> {
        self.transact(|tx| {
            let focus = tx
                .state
                .focus
                .current()
                .map(|s| timing::reconstruct(s, tx.now));
            Ok(TickStatus {
                focus,
                unlocks: tx.state.blocklist.statuses(tx.now),
                balance: tx.state.rewards.balance(),
                remaining_unlocks_today: tx
                    .state
                    .blocklist
                    .remaining_unlocks_today(tx.now, tx.offset),
            })
        })
    }

    // ── Reward commands ──────────────────────────────────────────────

    /// Credit the configured fruits for finishing a task.
    pub fn award_task_completion(
        &mut self,
        task_id: &str,
        title: &str,
    ) -> Result<Transition<RewardTransaction>, EngineError> {
        self.transact(|tx| {
            let amount = tx.config.task_completion_fruits;
            let mut metadata = Metadata::new();
            metadata.insert("taskId".into(), json!(task_id));
            tx.credit(
                amount,
                RewardSource::TaskCompletion,
                format!("Task completed: {title}"),
                metadata,
            )
        })
    }

    /// Credit fruits by hand.
    pub fn grant(
        &mut self,
        amount: u64,
        description: &str,
    ) -> Result<Transition<RewardTransaction>, EngineError> {
        self.transact(|tx| tx.credit(amount, RewardSource::Manual, description, Metadata::new()))
    }

    /// Fold transactions older than `before` into the archived totals.
    pub fn archive_transactions(
        &mut self,
        before: DateTime<Utc>,
    ) -> Result<Transition<usize>, EngineError> {
        self.transact(|tx| {
            let count = tx.state.rewards.archive_before(before);
            tx.state.rewards.check_integrity()?;
            if count > 0 {
                tx.emit(Event::TransactionsArchived {
                    count,
                    before,
                    at: tx.now,
                });
            }
            Ok(count)
        })
    }

    // ── Unlock commands ──────────────────────────────────────────────

    /// Buy temporary access to `app_tokens` for `duration_minutes`.
    ///
    /// Checks run in order: token set, blocking enabled, duration, daily
    /// quota, balance. An active unlock overlapping the request is replaced
    /// without refund.
    pub fn request_unlock(
        &mut self,
        app_tokens: AppTokenSet,
        duration_minutes: u32,
    ) -> Result<Transition<UnlockStatus>, EngineError> {
        self.transact(|tx| {
            let cost = tx.state.blocklist.check_request(
                &app_tokens,
                duration_minutes,
                tx.state.rewards.balance(),
                tx.now,
                tx.offset,
            )?;

            let grant = tx
                .state
                .blocklist
                .grant(app_tokens, duration_minutes, cost, tx.now);

            let mut metadata = Metadata::new();
            metadata.insert("unlockId".into(), json!(grant.session.id));
            metadata.insert("durationMinutes".into(), json!(duration_minutes));
            metadata.insert("appCount".into(), json!(grant.session.app_tokens.len()));
            tx.debit(
                cost,
                RewardSource::AppUnlock,
                format!("Unlocked apps for {duration_minutes} min"),
                metadata,
            )?;

            for old in &grant.replaced {
                tx.emit(Event::UnlockEnded {
                    unlock_id: old.id.clone(),
                    reason: UnlockEndReason::Replaced,
                    at: tx.now,
                });
            }
            tx.emit(Event::UnlockGranted {
                unlock_id: grant.session.id.clone(),
                app_tokens: grant.session.app_tokens.clone(),
                duration_minutes,
                cost,
                expires_at: grant.session.expires_at(),
                at: tx.now,
            });
            tx.effect(Effect::RemoveBlock(grant.session.app_tokens.clone()));
            if !grant.relock.is_empty() {
                tx.effect(Effect::ApplyBlock(grant.relock.clone()));
            }

            let pruned = tx
                .state
                .blocklist
                .prune_history(tx.now, tx.config.unlock_history_days);
            if pruned > 0 {
                tracing::debug!(pruned, "unlock history pruned");
            }
            Ok(UnlockStatus::of(&grant.session, tx.now))
        })
    }

    /// End an unlock before its window closes. Nothing is refunded.
    pub fn end_unlock_early(&mut self, id: &str) -> Result<Transition<UnlockSession>, EngineError> {
        self.transact(|tx| {
            let ended = tx.state.blocklist.end_early(id, tx.now)?;
            tx.emit(Event::UnlockEnded {
                unlock_id: ended.id.clone(),
                reason: UnlockEndReason::EndedEarly,
                at: tx.now,
            });
            let relock = tx.state.blocklist.uncovered(&ended.app_tokens);
            if !relock.is_empty() {
                tx.effect(Effect::ApplyBlock(relock));
            }
            Ok(ended)
        })
    }

    pub fn remaining_unlocks_today(&mut self) -> Result<Transition<u32>, EngineError> {
        self.transact(|tx| {
            Ok(tx
                .state
                .blocklist
                .remaining_unlocks_today(tx.now, tx.offset))
        })
    }

    pub fn active_unlocks(&mut self) -> Result<Transition<Vec<UnlockStatus>>, EngineError> {
        self.transact(|tx| Ok(tx.state.blocklist.statuses(tx.now)))
    }

    // ── Settings commands ────────────────────────────────────────────

    pub fn adjust_settings(
        &mut self,
        adjustment: SettingsAdjustment,
    ) -> Result<Transition<BlocklistSettings>, EngineError> {
        self.transact(|tx| {
            let settings = &mut tx.state.blocklist.settings;
            if !settings.adjust(adjustment) {
                return Ok(*settings);
            }
            let settings = *settings;
            tx.emit(Event::SettingsChanged {
                settings,
                at: tx.now,
            });
            if matches!(
                adjustment,
                SettingsAdjustment::Enable | SettingsAdjustment::Disable
            ) {
                tx.effect(Effect::PublishShield);
            }
            Ok(settings)
        })
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Reconcile, run `op`, and commit if everything succeeded.
    ///
    /// Reconciliation commits on its own: when `op` is rejected, the expiry
    /// and auto-completion it found are kept, and their events and effects
    /// wait in [`Engine::take_settled`]. They are also prepended to the next
    /// committed transition if nobody drained them.
    fn transact<T>(
        &mut self,
        op: impl FnOnce(&mut Scratch<'_>) -> Result<T, EngineError>,
    ) -> Result<Transition<T>, EngineError> {
        let now = self.clock.now();
        let mut scratch = Scratch {
            state: self.state.clone(),
            config: &self.config,
            now,
            offset: self.clock.utc_offset_at(now),
            events: Vec::new(),
            effects: Vec::new(),
            reconciled: Reconciled::default(),
        };
        scratch.reconcile()?;
        let settled_state = (!scratch.reconciled.is_empty()).then(|| scratch.state.clone());
        let (settled_events, settled_effects) = (scratch.events.len(), scratch.effects.len());

        let value = match op(&mut scratch) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "operation rejected");
                let Scratch {
                    mut events,
                    mut effects,
                    ..
                } = scratch;
                if let Some(state) = settled_state {
                    events.truncate(settled_events);
                    effects.truncate(settled_effects);
                    self.state = state;
                    self.settled.events.append(&mut events);
                    self.settled.effects.append(&mut effects);
                }
                return Err(err);
            }
        };

        let Scratch {
            state,
            events,
            effects,
            ..
        } = scratch;
        let Settled {
            events: mut all_events,
            effects: mut all_effects,
        } = std::mem::take(&mut self.settled);
        all_events.extend(events);
        for effect in effects {
            if effect == Effect::PublishShield && all_effects.contains(&effect) {
                continue;
            }
            all_effects.push(effect);
        }
        if !all_events.is_empty() || !all_effects.is_empty() {
            all_effects.push(Effect::Persist);
        }
        for event in &all_events {
            tracing::debug!(event = event.name(), "engine event");
        }
        self.state = state;
        Ok(Transition {
            value,
            events: all_events,
            effects: all_effects,
        })
    }
}

/// Reconciliation kept from rejected operations, not yet handed out.
#[derive(Debug, Default)]
struct Settled {
    events: Vec<Event>,
    effects: Vec<Effect>,
}

/// Working copy for one transition.
struct Scratch<'a> {
    state: EngineState,
    config: &'a EngineConfig,
    now: DateTime<Utc>,
    offset: FixedOffset,
    events: Vec<Event>,
    effects: Vec<Effect>,
    reconciled: Reconciled,
}

impl Scratch<'_> {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    fn take_reconciled(&mut self) -> Reconciled {
        std::mem::take(&mut self.reconciled)
    }

    fn reconcile(&mut self) -> Result<(), EngineError> {
        for unlock in self.state.blocklist.sweep_expired(self.now) {
            self.emit(Event::UnlockEnded {
                unlock_id: unlock.id.clone(),
                reason: UnlockEndReason::Expired,
                at: unlock.ended_at.unwrap_or(self.now),
            });
            self.effect(Effect::ApplyBlock(unlock.app_tokens.clone()));
            self.reconciled.expired.push(unlock);
        }

        if let Some(session) = self
            .state
            .focus
            .auto_complete(self.config.minutes_per_fruit, self.now)
        {
            tracing::info!(session_id = %session.id, "overdue focus session auto-completed");
            self.settle_completion(&session, true)?;
            self.reconciled.completed = Some(session);
        }
        Ok(())
    }

    /// Credit a completed session and any streak bonus it earns.
    fn settle_completion(&mut self, session: &FocusSession, auto: bool) -> Result<(), EngineError> {
        self.emit(Event::FocusCompleted {
            session_id: session.id.clone(),
            duration_minutes: session.duration,
            fruits_earned: session.fruits_earned,
            auto,
            at: self.now,
        });

        if session.fruits_earned > 0 {
            let mut metadata = Metadata::new();
            metadata.insert("sessionId".into(), json!(session.id));
            metadata.insert("durationMinutes".into(), json!(session.duration));
            if auto {
                metadata.insert("autoCompleted".into(), json!(true));
            }
            self.credit(
                session.fruits_earned,
                RewardSource::FocusSession,
                format!("Focus session ({} min)", session.duration),
                metadata,
            )?;
        }

        let bonus = streak::bonus_due(
            self.state.focus.history(),
            session,
            self.offset,
            &self.config.streak,
        );
        if let Some(days) = bonus {
            self.emit(Event::StreakReached { days, at: self.now });
            let mut metadata = Metadata::new();
            metadata.insert("streakDays".into(), json!(days));
            self.credit(
                self.config.streak.bonus_fruits,
                RewardSource::StreakBonus,
                format!("{days}-day focus streak"),
                metadata,
            )?;
        }
        Ok(())
    }

    fn credit(
        &mut self,
        amount: u64,
        source: RewardSource,
        description: impl Into<String>,
        metadata: Metadata,
    ) -> Result<RewardTransaction, EngineError> {
        let tx = self
            .state
            .rewards
            .credit(amount, source, description, metadata, self.now)?
            .clone();
        self.emit(Event::RewardCredited {
            transaction_id: tx.id.clone(),
            amount,
            source,
            balance: self.state.rewards.balance(),
            at: self.now,
        });
        self.publish_shield();
        Ok(tx)
    }

    fn debit(
        &mut self,
        amount: u64,
        source: RewardSource,
        description: impl Into<String>,
        metadata: Metadata,
    ) -> Result<RewardTransaction, EngineError> {
        let tx = self
            .state
            .rewards
            .debit(amount, source, description, metadata, self.now)?
            .clone();
        self.emit(Event::RewardDebited {
            transaction_id: tx.id.clone(),
            amount,
            source,
            balance: self.state.rewards.balance(),
            at: self.now,
        });
        self.publish_shield();
        Ok(tx)
    }

    fn publish_shield(&mut self) {
        if !self.effects.contains(&Effect::PublishShield) {
            self.effects.push(Effect::PublishShield);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::focus::SessionStatus;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn engine() -> Engine<ManualClock> {
        Engine::fresh(EngineConfig::default(), ManualClock::new(t0()))
    }

    #[test]
    fn start_then_complete_credits_fruits() {
        let mut engine = engine();
        let started = engine.start_focus(25, None, None).unwrap();
        assert!(started.needs_persist());

        engine.clock().advance_mins(20);
        let done = engine.complete_focus().unwrap();
        assert_eq!(done.value.status, SessionStatus::Completed);
        assert_eq!(done.value.duration, 20);
        assert_eq!(done.value.fruits_earned, 4);
        assert_eq!(engine.balance(), 4);
        assert!(done.effects.contains(&Effect::PublishShield));
        assert!(done.needs_persist());
    }

    #[test]
    fn failed_operation_leaves_state_untouched() {
        let mut engine = engine();
        let before = engine.state().clone();
        assert_eq!(
            engine.pause_focus().unwrap_err(),
            EngineError::NoActiveSession
        );
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn insufficient_balance_does_not_debit() {
        let mut engine = engine();
        engine.grant(5, "seed").unwrap();
        let err = engine
            .request_unlock(AppTokenSet::new(["app"]), 10)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientBalance {
                requested: 10,
                balance: 5
            }
        );
        assert_eq!(engine.balance(), 5);
        assert!(engine.state().blocklist.active().is_empty());
    }

    #[test]
    fn reads_without_changes_have_no_effects() {
        let mut engine = engine();
        let t = engine.remaining_unlocks_today().unwrap();
        assert_eq!(t.value, 5);
        assert!(t.effects.is_empty());
        assert!(t.events.is_empty());
    }

    #[test]
    fn settings_toggle_publishes_shield() {
        let mut engine = engine();
        let t = engine.adjust_settings(SettingsAdjustment::Disable).unwrap();
        assert!(!t.value.is_enabled);
        assert!(t.effects.contains(&Effect::PublishShield));

        let t = engine.adjust_settings(SettingsAdjustment::IncreaseCost).unwrap();
        assert_eq!(t.value.unlock_cost_per_minute, 2);
        assert!(!t.effects.contains(&Effect::PublishShield));
        assert!(t.needs_persist());

        let t = engine.adjust_settings(SettingsAdjustment::Disable).unwrap();
        assert!(t.effects.is_empty());
    }

    #[test]
    fn disabled_blocking_rejects_unlocks() {
        let mut engine = engine();
        engine.grant(100, "seed").unwrap();
        engine.adjust_settings(SettingsAdjustment::Disable).unwrap();
        assert_eq!(
            engine
                .request_unlock(AppTokenSet::new(["a"]), 10)
                .unwrap_err(),
            EngineError::BlockingDisabled
        );
    }

    #[test]
    fn overlapping_unlock_replaces_and_relocks_leftovers() {
        let mut engine = engine();
        engine.grant(100, "seed").unwrap();
        let first = engine
            .request_unlock(AppTokenSet::new(["a", "b"]), 15)
            .unwrap();
        let second = engine
            .request_unlock(AppTokenSet::new(["b", "c"]), 15)
            .unwrap();

        assert_eq!(engine.state().blocklist.active().len(), 1);
        assert_eq!(engine.balance(), 70);
        assert!(second
            .effects
            .contains(&Effect::RemoveBlock(AppTokenSet::new(["b", "c"]))));
        assert!(second
            .effects
            .contains(&Effect::ApplyBlock(AppTokenSet::new(["a"]))));
        assert!(second.events.iter().any(|e| matches!(
            e,
            Event::UnlockEnded { unlock_id, reason: UnlockEndReason::Replaced, .. }
                if *unlock_id == first.value.session.id
        )));
    }

    #[test]
    fn end_unlock_early_relocks_without_refund() {
        let mut engine = engine();
        engine.grant(30, "seed").unwrap();
        let unlock = engine.request_unlock(AppTokenSet::new(["a"]), 20).unwrap();
        let id = unlock.value.session.id.clone();

        engine.clock().advance_mins(5);
        let ended = engine.end_unlock_early(&id).unwrap();
        assert_eq!(ended.value.end_reason, Some(UnlockEndReason::EndedEarly));
        assert_eq!(ended.block_count(), 1);
        assert_eq!(engine.balance(), 10);

        assert_eq!(
            engine.end_unlock_early(&id).unwrap_err(),
            EngineError::UnlockNotActive(id)
        );
        assert!(matches!(
            engine.end_unlock_early("nope").unwrap_err(),
            EngineError::UnknownUnlockSession(_)
        ));
    }

    #[test]
    fn task_completion_and_archive() {
        let mut engine = engine();
        let t = engine.award_task_completion("task-1", "Write report").unwrap();
        assert_eq!(t.value.source, RewardSource::TaskCompletion);
        assert_eq!(t.value.metadata["taskId"], json!("task-1"));
        assert_eq!(engine.balance(), 1);

        engine.clock().advance_mins(60);
        engine.grant(2, "later").unwrap();
        let archived = engine.archive_transactions(t0() + chrono::Duration::minutes(30)).unwrap();
        assert_eq!(archived.value, 1);
        assert_eq!(engine.state().rewards.transactions().len(), 1);
        assert_eq!(engine.balance(), 3);
        engine.state().rewards.check_integrity().unwrap();
    }

    #[test]
    fn completing_an_overdue_session_returns_the_auto_completion() {
        let mut engine = engine();
        engine.start_focus(25, None, None).unwrap();
        engine.clock().advance_mins(40);

        let done = engine.complete_focus().unwrap();
        assert_eq!(done.value.duration, 25);
        assert_eq!(done.value.end_time, Some(t0() + chrono::Duration::minutes(25)));
        assert!(done.events.iter().any(|e| matches!(e, Event::FocusCompleted { auto: true, .. })));
        assert_eq!(engine.balance(), 5);

        assert_eq!(
            engine.complete_focus().unwrap_err(),
            EngineError::NoActiveSession
        );
        assert_eq!(engine.balance(), 5);
    }

    #[test]
    fn rejected_operation_keeps_the_expiry_it_found() {
        let mut engine = engine();
        engine.grant(10, "seed").unwrap();
        engine.request_unlock(AppTokenSet::new(["a"]), 1).unwrap();
        engine.clock().advance_secs(61);

        assert!(engine.pause_focus().is_err());
        assert!(engine.state().blocklist.active().is_empty());

        let settled = engine.take_settled();
        assert_eq!(settled.block_count(), 1);
        assert!(settled.needs_persist());
        assert!(engine.take_settled().effects.is_empty());

        let read = engine.active_unlocks().unwrap();
        assert!(read.value.is_empty());
        assert_eq!(read.block_count(), 0);
    }

    #[test]
    fn undrained_settlement_rides_on_the_next_commit() {
        let mut engine = engine();
        engine.grant(10, "seed").unwrap();
        engine.request_unlock(AppTokenSet::new(["a"]), 1).unwrap();
        engine.clock().advance_secs(61);

        assert!(engine.request_unlock(AppTokenSet::new(["b"]), 90).is_err());
        let next = engine.grant(1, "more").unwrap();
        assert_eq!(next.block_count(), 1);
        assert!(next
            .events
            .iter()
            .any(|e| matches!(e, Event::UnlockEnded { .. })));
        assert_eq!(
            next.effects
                .iter()
                .filter(|e| **e == Effect::PublishShield)
                .count(),
            1
        );
    }
}
