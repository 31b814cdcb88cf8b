//! TOML-based application configuration.
//!
//! Stores the tunables of the reward economy and the host:
//! - Fruit conversion rates and the streak bonus
//! - Default unlock settings and how long unlock history is kept
//! - Shield copy templates and the deep link scheme
//! - Log level
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::blocklist::{BlocklistSettings, ShieldTemplates};
use crate::engine::EngineConfig;
use crate::error::ConfigError;
use crate::rewards::StreakPolicy;

/// Reward economy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsConfig {
    #[serde(default = "default_minutes_per_fruit")]
    pub minutes_per_fruit: u32,
    #[serde(default = "default_task_completion_fruits")]
    pub task_completion_fruits: u64,
    #[serde(default = "default_streak_bonus_fruits")]
    pub streak_bonus_fruits: u64,
    #[serde(default = "default_streak_bonus_interval_days")]
    pub streak_bonus_interval_days: u32,
}

/// Defaults applied to a fresh blocklist, plus history retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocklistConfig {
    #[serde(default = "default_cost_per_minute")]
    pub unlock_cost_per_minute: u32,
    #[serde(default = "default_max_unlock_duration")]
    pub max_unlock_duration: u32,
    #[serde(default = "default_allowed_unlocks_per_day")]
    pub allowed_unlocks_per_day: u32,
    #[serde(default = "default_unlock_history_days")]
    pub unlock_history_days: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `ORCHARD_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub blocklist: BlocklistConfig,
    #[serde(default)]
    pub shield: ShieldTemplates,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default functions
fn default_minutes_per_fruit() -> u32 {
    5
}
fn default_task_completion_fruits() -> u64 {
    1
}
fn default_streak_bonus_fruits() -> u64 {
    5
}
fn default_streak_bonus_interval_days() -> u32 {
    7
}
fn default_cost_per_minute() -> u32 {
    BlocklistSettings::default().unlock_cost_per_minute
}
fn default_max_unlock_duration() -> u32 {
    BlocklistSettings::default().max_unlock_duration
}
fn default_allowed_unlocks_per_day() -> u32 {
    BlocklistSettings::default().allowed_unlocks_per_day
}
fn default_unlock_history_days() -> u32 {
    30
}
fn default_log_level() -> String {
    "warn".into()
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            minutes_per_fruit: default_minutes_per_fruit(),
            task_completion_fruits: default_task_completion_fruits(),
            streak_bonus_fruits: default_streak_bonus_fruits(),
            streak_bonus_interval_days: default_streak_bonus_interval_days(),
        }
    }
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            unlock_cost_per_minute: default_cost_per_minute(),
            max_unlock_duration: default_max_unlock_duration(),
            allowed_unlocks_per_day: default_allowed_unlocks_per_day(),
            unlock_history_days: default_unlock_history_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location, `<data_dir>/config.toml`.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from the default location, writing defaults if absent.
    ///
    /// # Errors
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is absent.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed or is out of
    /// range, or if defaults cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration");
            Self::default()
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. The change is not saved.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or is out of range. The config is unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let mut json = serde_json::to_value(&*self).map_err(|e| invalid(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let next: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };
        if self.rewards.minutes_per_fruit == 0 {
            return invalid("rewards.minutes_per_fruit", "must be at least 1");
        }
        if self.blocklist.unlock_history_days == 0 {
            return invalid("blocklist.unlock_history_days", "must be at least 1");
        }
        if self.shield.deep_link_scheme.is_empty()
            || !self
                .shield
                .deep_link_scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return invalid("shield.deep_link_scheme", "not a valid URL scheme");
        }
        Ok(())
    }

    /// Settings a fresh blocklist starts with, clamped into range.
    pub fn default_settings(&self) -> BlocklistSettings {
        BlocklistSettings {
            unlock_cost_per_minute: self.blocklist.unlock_cost_per_minute,
            max_unlock_duration: self.blocklist.max_unlock_duration,
            allowed_unlocks_per_day: self.blocklist.allowed_unlocks_per_day,
            is_enabled: true,
        }
        .clamped()
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            minutes_per_fruit: self.rewards.minutes_per_fruit.max(1),
            task_completion_fruits: self.rewards.task_completion_fruits,
            streak: StreakPolicy {
                bonus_fruits: self.rewards.streak_bonus_fruits,
                interval_days: self.rewards.streak_bonus_interval_days,
            },
            unlock_history_days: self.blocklist.unlock_history_days.max(1),
            default_settings: self.default_settings(),
        }
    }
}
