use serde::{Deserialize, Serialize};

use crate::blocklist::{BlocklistSettings, BlocklistState};
use crate::focus::FocusState;
use crate::rewards::{RewardLedger, StreakPolicy};

/// Everything the engine owns. This is also the body of the persisted
/// document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    #[serde(default)]
    pub focus: FocusState,
    #[serde(default)]
    pub rewards: RewardLedger,
    #[serde(default)]
    pub blocklist: BlocklistState,
}

impl EngineState {
    /// A fresh state whose blocklist starts from `settings`.
    pub fn with_settings(settings: BlocklistSettings) -> Self {
        Self {
            blocklist: BlocklistState::with_settings(settings.clamped()),
            ..Self::default()
        }
    }
}

/// Tunables that shape engine behavior but are not part of its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Focus minutes per fruit. Always at least 1.
    pub minutes_per_fruit: u32,
    pub task_completion_fruits: u64,
    pub streak: StreakPolicy,
    /// Ended unlocks older than this are pruned on purchase.
    pub unlock_history_days: u32,
    /// Settings a fresh blocklist starts with.
    pub default_settings: BlocklistSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minutes_per_fruit: 5,
            task_completion_fruits: 1,
            streak: StreakPolicy::default(),
            unlock_history_days: 30,
            default_settings: BlocklistSettings::default(),
        }
    }
}
