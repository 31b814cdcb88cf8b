//! Property tests: arbitrary operation sequences keep the ledger and the
//! blocking channel consistent.

use chrono::{Duration, TimeZone, Utc};
use orchard_core::blocklist::ChannelBridge;
use orchard_core::rewards::Metadata;
use orchard_core::{
    AppTokenSet, Clock, EngineConfig, Host, LoadSource, ManualClock, MemoryStore, RewardLedger,
    RewardSource, ShieldTemplates, StateStore,
};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Grant(u64),
    Unlock(Vec<usize>, u32),
    EndFirst,
    Focus(u32),
    Complete,
    Advance(i64),
}

const APPS: [&str; 4] = ["mail", "news", "social", "video"];

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u64..80).prop_map(Op::Grant),
        (prop::collection::vec(0usize..APPS.len(), 1..3), 1u32..75)
            .prop_map(|(apps, minutes)| Op::Unlock(apps, minutes)),
        Just(Op::EndFirst),
        (0u32..40).prop_map(Op::Focus),
        Just(Op::Complete),
        (1i64..120).prop_map(Op::Advance),
    ]
}

fn tokens(indices: &[usize]) -> AppTokenSet {
    AppTokenSet::new(indices.iter().map(|&i| APPS[i]))
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// The shared exempt set always equals the union of active unlocks, the
    /// ledger always balances, and the stored document always reloads as-is.
    #[test]
    fn engine_stays_consistent(ops in prop::collection::vec(arb_op(), 1..40)) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());
        let mut host = Host::open(
            MemoryStore::new(),
            ChannelBridge::new(MemoryStore::new()),
            &clock,
            EngineConfig::default(),
            ShieldTemplates::default(),
        );

        for op in ops {
            let _ = match op {
                Op::Grant(n) => host.run(|e| e.grant(n, "seed")).map(|_| ()),
                Op::Unlock(apps, minutes) => host
                    .run(|e| e.request_unlock(tokens(&apps), minutes))
                    .map(|_| ()),
                Op::EndFirst => {
                    let first = host
                        .engine()
                        .state()
                        .blocklist
                        .active()
                        .first()
                        .map(|s| s.id.clone());
                    match first {
                        Some(id) => host.run(|e| e.end_unlock_early(&id)).map(|_| ()),
                        None => Ok(()),
                    }
                }
                Op::Focus(minutes) => host
                    .run(|e| e.start_focus(minutes, None, None))
                    .map(|_| ()),
                Op::Complete => host.run(|e| e.complete_focus()).map(|_| ()),
                Op::Advance(mins) => {
                    clock.advance_mins(mins);
                    Ok(())
                }
            };

            let tick = host.run(|e| e.tick());
            prop_assert!(tick.is_ok());

            let state = host.engine().state();
            prop_assert!(state.rewards.check_integrity().is_ok());
            prop_assert_eq!(
                state.rewards.balance(),
                state.rewards.total_earned() - state.rewards.total_spent()
            );

            let covered = state
                .blocklist
                .active()
                .iter()
                .fold(AppTokenSet::default(), |acc, s| acc.union(&s.app_tokens));
            prop_assert_eq!(host.bridge().exempt().unwrap(), covered);

            if !host.store().kv().is_empty() {
                let (reloaded, report) =
                    StateStore::new(host.store().kv().clone()).load(clock.now());
                prop_assert_eq!(report.source, LoadSource::Current);
                prop_assert_eq!(&reloaded, host.engine().state());
            }
        }
    }

    /// Debits never overdraw, and archival never changes the balance.
    #[test]
    fn ledger_never_overdraws(
        ops in prop::collection::vec((any::<bool>(), 1u64..50), 1..60),
        cutoff_mins in 0i64..120,
    ) {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let mut ledger = RewardLedger::new();

        for (i, (is_credit, amount)) in ops.into_iter().enumerate() {
            let at = start + Duration::minutes(i as i64);
            let before = ledger.balance();
            if is_credit {
                ledger
                    .credit(amount, RewardSource::Manual, "credit", Metadata::new(), at)
                    .unwrap();
                prop_assert_eq!(ledger.balance(), before + amount);
            } else {
                let result = ledger.debit(amount, RewardSource::AppUnlock, "debit", Metadata::new(), at);
                prop_assert_eq!(result.is_ok(), amount <= before);
                if amount > before {
                    prop_assert_eq!(ledger.balance(), before);
                }
            }
            prop_assert!(ledger.check_integrity().is_ok());
        }

        let balance = ledger.balance();
        ledger.archive_before(start + Duration::minutes(cutoff_mins));
        prop_assert_eq!(ledger.balance(), balance);
        prop_assert!(ledger.check_integrity().is_ok());
    }
}
