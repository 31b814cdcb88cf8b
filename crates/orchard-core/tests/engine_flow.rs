//! End-to-end engine scenarios driven by a manual clock.

use chrono::{FixedOffset, TimeZone, Utc};
use orchard_core::blocklist::BridgeCall;
use orchard_core::blocklist::PENDING_DEEP_LINK_KEY;
use orchard_core::{
    AppTokenSet, BlocklistSettings, ChannelBridge, DeepLink, Engine, EngineConfig, EngineError,
    EngineState, Event, Host, KvStore, ManualClock, MemoryStore, RecordingBridge, SessionStatus,
    ShieldChannel, ShieldTemplates,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
}

fn engine_with(settings: BlocklistSettings, clock: &ManualClock) -> Engine<&ManualClock> {
    Engine::new(
        EngineState::with_settings(settings),
        EngineConfig::default(),
        clock,
    )
}

fn apps(names: &[&str]) -> AppTokenSet {
    AppTokenSet::new(names.iter().copied())
}

// ============================================================================
// Focus
// ============================================================================

#[test]
fn overdue_session_auto_completes_with_planned_minutes() {
    let clock = clock();
    let mut engine = Engine::fresh(EngineConfig::default(), &clock);
    engine.start_focus(25, None, None).unwrap();

    clock.advance_mins(30);
    let tick = engine.tick().unwrap();
    assert!(tick.value.focus.is_none());
    assert_eq!(tick.value.balance, 5);
    assert!(tick.events.iter().any(|e| matches!(
        e,
        Event::FocusCompleted {
            auto: true,
            duration_minutes: 25,
            fruits_earned: 5,
            ..
        }
    )));

    let done = engine.state().focus.history().last().unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.duration, 25);
    assert_eq!(done.fruits_earned, 5);

    // Repeated reads settle nothing new.
    for _ in 0..3 {
        let again = engine.tick().unwrap();
        assert!(again.events.is_empty());
        assert_eq!(again.value.balance, 5);
    }
    assert_eq!(engine.state().rewards.transactions().len(), 1);
}

#[test]
fn paused_time_is_not_counted() {
    let clock = clock();
    let mut engine = Engine::fresh(EngineConfig::default(), &clock);
    engine.start_focus(25, None, None).unwrap();

    clock.advance_mins(10);
    engine.pause_focus().unwrap();
    clock.advance_mins(30);
    engine.resume_focus().unwrap();
    clock.advance_mins(5);

    let timing = engine.focus_timing().unwrap();
    assert_eq!(timing.elapsed_secs, 15 * 60);
    assert_eq!(timing.remaining_secs, Some(10 * 60));

    let done = engine.complete_focus().unwrap().value;
    assert_eq!(done.duration, 15);
    assert_eq!(done.fruits_earned, 3);
}

#[test]
fn second_start_is_rejected_while_running() {
    let clock = clock();
    let mut engine = Engine::fresh(EngineConfig::default(), &clock);
    engine.start_focus(25, None, None).unwrap();
    let err = engine.start_focus(25, None, None).unwrap_err();
    assert!(matches!(err, EngineError::SessionInProgress { .. }));
}

// ============================================================================
// Unlock economy
// ============================================================================

#[test]
fn unlock_cost_scales_with_minutes() {
    let clock = clock();
    let settings = BlocklistSettings {
        unlock_cost_per_minute: 2,
        ..BlocklistSettings::default()
    };
    let mut engine = engine_with(settings, &clock);
    engine.grant(40, "seed").unwrap();

    let unlock = engine.request_unlock(apps(&["social"]), 15).unwrap().value;
    assert_eq!(unlock.session.cost, 30);
    assert_eq!(engine.balance(), 10);

    let err = engine.request_unlock(apps(&["video"]), 15).unwrap_err();
    assert_eq!(
        err,
        EngineError::InsufficientBalance {
            requested: 30,
            balance: 10
        }
    );
    assert_eq!(engine.balance(), 10);
}

#[test]
fn daily_quota_is_enforced_and_resets_at_midnight() {
    let clock = clock();
    let settings = BlocklistSettings {
        allowed_unlocks_per_day: 3,
        ..BlocklistSettings::default()
    };
    let mut engine = engine_with(settings, &clock);
    engine.grant(200, "seed").unwrap();

    for app in ["a", "b", "c"] {
        engine.request_unlock(apps(&[app]), 15).unwrap();
    }
    let err = engine.request_unlock(apps(&["d"]), 15).unwrap_err();
    assert_eq!(err, EngineError::DailyLimitReached { allowed: 3 });
    assert_eq!(engine.balance(), 155);

    clock.set(Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 1).unwrap());
    assert_eq!(engine.remaining_unlocks_today().unwrap().value, 3);
    engine.request_unlock(apps(&["d"]), 15).unwrap();
}

#[test]
fn quota_days_follow_the_local_offset() {
    let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
    // 23:30 local.
    let clock = ManualClock::with_offset(Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 0).unwrap(), tokyo);
    let settings = BlocklistSettings {
        allowed_unlocks_per_day: 1,
        ..BlocklistSettings::default()
    };
    let mut engine = engine_with(settings, &clock);
    engine.grant(50, "seed").unwrap();
    engine.request_unlock(apps(&["a"]), 15).unwrap();
    assert_eq!(engine.remaining_unlocks_today().unwrap().value, 0);

    clock.advance_mins(60);
    assert_eq!(engine.remaining_unlocks_today().unwrap().value, 1);
}

#[test]
fn duration_above_the_maximum_is_rejected() {
    let clock = clock();
    let mut engine = Engine::fresh(EngineConfig::default(), &clock);
    engine.grant(500, "seed").unwrap();
    let err = engine.request_unlock(apps(&["a"]), 61).unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidDuration {
            requested: 61,
            max: 60
        }
    );
}

// ============================================================================
// Expiry through the host
// ============================================================================

#[test]
fn expired_unlock_is_reblocked_exactly_once() {
    let clock = clock();
    let mut host = Host::open(
        MemoryStore::new(),
        RecordingBridge::new(),
        &clock,
        EngineConfig::default(),
        ShieldTemplates::default(),
    );
    host.run(|e| e.grant(10, "seed")).unwrap();
    host.run(|e| e.request_unlock(apps(&["a"]), 1)).unwrap();
    host.bridge_mut().clear();

    clock.advance_secs(61);
    let first = host.run(|e| e.tick()).unwrap();
    assert!(first.value.unlocks.is_empty());
    assert!(first.events.iter().any(|e| matches!(e, Event::UnlockEnded { .. })));

    for _ in 0..5 {
        host.run(|e| e.tick()).unwrap();
        host.run(|e| e.active_unlocks()).unwrap();
    }
    assert_eq!(host.bridge().apply_count(), 1);
    assert_eq!(host.bridge().calls(), &[BridgeCall::ApplyBlock(apps(&["a"]))]);

    let history = &host.engine().state().blocklist.unlock_history;
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].ended_at,
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 1, 0).unwrap())
    );
}

#[test]
fn expiry_while_closed_is_settled_on_open() {
    let clock = clock();
    let mut kv = MemoryStore::new();
    {
        let mut host = Host::open(
            &mut kv,
            RecordingBridge::new(),
            &clock,
            EngineConfig::default(),
            ShieldTemplates::default(),
        );
        host.run(|e| e.grant(10, "seed")).unwrap();
        host.run(|e| e.request_unlock(apps(&["a", "b"]), 5)).unwrap();
    }

    clock.advance_mins(90);
    let host = Host::open(
        &mut kv,
        RecordingBridge::new(),
        &clock,
        EngineConfig::default(),
        ShieldTemplates::default(),
    );
    assert_eq!(host.startup().value.reconciled.expired.len(), 1);
    assert_eq!(host.bridge().calls(), &[BridgeCall::ApplyBlock(apps(&["a", "b"]))]);
    assert!(host.engine().state().blocklist.active().is_empty());
}

#[test]
fn rejected_request_still_reblocks_expired_unlocks() {
    let clock = clock();
    let config = EngineConfig {
        default_settings: BlocklistSettings {
            allowed_unlocks_per_day: 1,
            ..BlocklistSettings::default()
        },
        ..EngineConfig::default()
    };
    let mut host = Host::open(
        MemoryStore::new(),
        RecordingBridge::new(),
        &clock,
        config,
        ShieldTemplates::default(),
    );
    host.run(|e| e.grant(10, "seed")).unwrap();
    host.run(|e| e.request_unlock(apps(&["a"]), 1)).unwrap();
    host.bridge_mut().clear();

    clock.advance_secs(61);
    let err = host
        .run(|e| e.request_unlock(apps(&["b"]), 1))
        .unwrap_err();
    assert_eq!(err, EngineError::DailyLimitReached { allowed: 1 });
    assert!(host.engine().state().blocklist.active().is_empty());
    assert_eq!(host.bridge().calls(), &[BridgeCall::ApplyBlock(apps(&["a"]))]);
    assert_eq!(host.engine().balance(), 9);

    host.run(|e| e.tick()).unwrap();
    assert_eq!(host.bridge().apply_count(), 1);
}

// ============================================================================
// Deep links
// ============================================================================

#[test]
fn deep_link_is_consumed_on_open() {
    let clock = clock();
    let mut shared = MemoryStore::new();
    ShieldChannel::new(&mut shared)
        .post_deep_link("orchard://unlock?currentBalance=42")
        .unwrap();

    let open = |shared: &mut MemoryStore| {
        Host::open(
            MemoryStore::new(),
            ChannelBridge::new(shared),
            &clock,
            EngineConfig::default(),
            ShieldTemplates::default(),
        )
        .startup()
        .clone()
    };

    let first = open(&mut shared);
    assert_eq!(
        first.value.deep_link,
        Some(DeepLink::Unlock {
            balance_hint: Some(42)
        })
    );
    assert!(shared.get(PENDING_DEEP_LINK_KEY).unwrap().is_none());

    let second = open(&mut shared);
    assert_eq!(second.value.deep_link, None);
}

#[test]
fn malformed_deep_link_is_a_warning() {
    let clock = clock();
    let mut bridge = RecordingBridge::new();
    bridge.post_deep_link("https://example.com/unlock");
    let host = Host::open(
        MemoryStore::new(),
        bridge,
        &clock,
        EngineConfig::default(),
        ShieldTemplates::default(),
    );
    assert_eq!(host.startup().value.deep_link, None);
    assert!(matches!(
        host.startup().warnings.as_slice(),
        [orchard_core::Warning::BridgeFailure {
            command: "take_pending_deep_link",
            ..
        }]
    ));
}
