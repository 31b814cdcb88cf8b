use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::blocklist::{AppTokenSet, BlocklistSettings, UnlockEndReason};
use crate::rewards::RewardSource;

/// Every state change in the engine produces an Event.
/// Hosts log them, and the CLI prints them alongside the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    FocusStarted {
        session_id: String,
        target_minutes: u32,
        at: DateTime<Utc>,
    },
    FocusScheduled {
        session_id: String,
        start_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    FocusPaused {
        session_id: String,
        elapsed_secs: i64,
        at: DateTime<Utc>,
    },
    FocusResumed {
        session_id: String,
        elapsed_secs: i64,
        at: DateTime<Utc>,
    },
    /// A session reached `completed`. `auto` is set when the countdown ran
    /// out without the user finishing it.
    FocusCompleted {
        session_id: String,
        duration_minutes: u32,
        fruits_earned: u64,
        auto: bool,
        at: DateTime<Utc>,
    },
    FocusCancelled {
        session_id: String,
        duration_minutes: u32,
        at: DateTime<Utc>,
    },
    /// A streak milestone was reached.
    StreakReached {
        days: u32,
        at: DateTime<Utc>,
    },
    RewardCredited {
        transaction_id: String,
        amount: u64,
        source: RewardSource,
        balance: u64,
        at: DateTime<Utc>,
    },
    RewardDebited {
        transaction_id: String,
        amount: u64,
        source: RewardSource,
        balance: u64,
        at: DateTime<Utc>,
    },
    TransactionsArchived {
        count: usize,
        before: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    UnlockGranted {
        unlock_id: String,
        app_tokens: AppTokenSet,
        duration_minutes: u32,
        cost: u64,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    UnlockEnded {
        unlock_id: String,
        reason: UnlockEndReason,
        at: DateTime<Utc>,
    },
    SettingsChanged {
        settings: BlocklistSettings,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Short snake_case name, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            Event::FocusStarted { .. } => "focus_started",
            Event::FocusScheduled { .. } => "focus_scheduled",
            Event::FocusPaused { .. } => "focus_paused",
            Event::FocusResumed { .. } => "focus_resumed",
            Event::FocusCompleted { .. } => "focus_completed",
            Event::FocusCancelled { .. } => "focus_cancelled",
            Event::StreakReached { .. } => "streak_reached",
            Event::RewardCredited { .. } => "reward_credited",
            Event::RewardDebited { .. } => "reward_debited",
            Event::TransactionsArchived { .. } => "transactions_archived",
            Event::UnlockGranted { .. } => "unlock_granted",
            Event::UnlockEnded { .. } => "unlock_ended",
            Event::SettingsChanged { .. } => "settings_changed",
        }
    }
}
