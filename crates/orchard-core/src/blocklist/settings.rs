//! Unlock economy settings.
//!
//! Settings only move in bounded steps. Every adjustment clamps to the
//! allowed range, so a settings value read back from the engine is always
//! valid.

use serde::{Deserialize, Serialize};

pub const COST_PER_MINUTE_RANGE: (u32, u32) = (1, 10);
pub const MAX_DURATION_RANGE: (u32, u32) = (15, 180);
pub const MAX_DURATION_STEP: u32 = 15;
pub const DAILY_UNLOCKS_RANGE: (u32, u32) = (1, 20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocklistSettings {
    #[serde(default = "default_cost_per_minute")]
    pub unlock_cost_per_minute: u32,
    #[serde(default = "default_max_duration")]
    pub max_unlock_duration: u32,
    #[serde(default = "default_daily_unlocks")]
    pub allowed_unlocks_per_day: u32,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

fn default_cost_per_minute() -> u32 {
    1
}
fn default_max_duration() -> u32 {
    60
}
fn default_daily_unlocks() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for BlocklistSettings {
    fn default() -> Self {
        Self {
            unlock_cost_per_minute: default_cost_per_minute(),
            max_unlock_duration: default_max_duration(),
            allowed_unlocks_per_day: default_daily_unlocks(),
            is_enabled: true,
        }
    }
}

/// A single bounded settings change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsAdjustment {
    IncreaseCost,
    DecreaseCost,
    IncreaseMaxDuration,
    DecreaseMaxDuration,
    IncreaseDailyUnlocks,
    DecreaseDailyUnlocks,
    Enable,
    Disable,
}

fn step(value: u32, delta: i64, (min, max): (u32, u32)) -> u32 {
    let next = (i64::from(value) + delta).clamp(i64::from(min), i64::from(max));
    u32::try_from(next).unwrap_or(min)
}

impl BlocklistSettings {
    pub fn increment_cost(&mut self) {
        self.unlock_cost_per_minute = step(self.unlock_cost_per_minute, 1, COST_PER_MINUTE_RANGE);
    }

    pub fn decrement_cost(&mut self) {
        self.unlock_cost_per_minute = step(self.unlock_cost_per_minute, -1, COST_PER_MINUTE_RANGE);
    }

    pub fn increment_max_duration(&mut self) {
        self.max_unlock_duration = step(
            self.max_unlock_duration,
            i64::from(MAX_DURATION_STEP),
            MAX_DURATION_RANGE,
        );
    }

    pub fn decrement_max_duration(&mut self) {
        self.max_unlock_duration = step(
            self.max_unlock_duration,
            -i64::from(MAX_DURATION_STEP),
            MAX_DURATION_RANGE,
        );
    }

    pub fn increment_daily_unlocks(&mut self) {
        self.allowed_unlocks_per_day = step(self.allowed_unlocks_per_day, 1, DAILY_UNLOCKS_RANGE);
    }

    pub fn decrement_daily_unlocks(&mut self) {
        self.allowed_unlocks_per_day = step(self.allowed_unlocks_per_day, -1, DAILY_UNLOCKS_RANGE);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
    }

    /// Apply an adjustment. Returns whether anything changed.
    pub fn adjust(&mut self, adjustment: SettingsAdjustment) -> bool {
        let before = *self;
        match adjustment {
            SettingsAdjustment::IncreaseCost => self.increment_cost(),
            SettingsAdjustment::DecreaseCost => self.decrement_cost(),
            SettingsAdjustment::IncreaseMaxDuration => self.increment_max_duration(),
            SettingsAdjustment::DecreaseMaxDuration => self.decrement_max_duration(),
            SettingsAdjustment::IncreaseDailyUnlocks => self.increment_daily_unlocks(),
            SettingsAdjustment::DecreaseDailyUnlocks => self.decrement_daily_unlocks(),
            SettingsAdjustment::Enable => self.set_enabled(true),
            SettingsAdjustment::Disable => self.set_enabled(false),
        }
        before != *self
    }

    /// The same settings with every field forced into range.
    pub fn clamped(self) -> Self {
        Self {
            unlock_cost_per_minute: step(self.unlock_cost_per_minute, 0, COST_PER_MINUTE_RANGE),
            max_unlock_duration: step(self.max_unlock_duration, 0, MAX_DURATION_RANGE),
            allowed_unlocks_per_day: step(self.allowed_unlocks_per_day, 0, DAILY_UNLOCKS_RANGE),
            is_enabled: self.is_enabled,
        }
    }

    pub fn is_within_bounds(&self) -> bool {
        *self == self.clamped()
    }
}
