use clap::{Subcommand, ValueEnum};
use orchard_core::{Config, SettingsAdjustment};

use super::{open_host, print_json, print_outcome, CliResult};

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Show the unlock settings
    Show,
    /// Move one setting by a single step
    Adjust {
        #[arg(value_enum)]
        change: Change,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Change {
    CostUp,
    CostDown,
    DurationUp,
    DurationDown,
    UnlocksUp,
    UnlocksDown,
    Enable,
    Disable,
}

impl From<Change> for SettingsAdjustment {
    fn from(change: Change) -> Self {
        match change {
            Change::CostUp => SettingsAdjustment::IncreaseCost,
            Change::CostDown => SettingsAdjustment::DecreaseCost,
            Change::DurationUp => SettingsAdjustment::IncreaseMaxDuration,
            Change::DurationDown => SettingsAdjustment::DecreaseMaxDuration,
            Change::UnlocksUp => SettingsAdjustment::IncreaseDailyUnlocks,
            Change::UnlocksDown => SettingsAdjustment::DecreaseDailyUnlocks,
            Change::Enable => SettingsAdjustment::Enable,
            Change::Disable => SettingsAdjustment::Disable,
        }
    }
}

pub fn run(action: SettingsAction, config: &Config) -> CliResult {
    let mut host = open_host(config)?;
    match action {
        SettingsAction::Show => print_json(&host.engine().state().blocklist.settings),
        SettingsAction::Adjust { change } => {
            print_outcome(&host.run(|e| e.adjust_settings(change.into()))?)
        }
    }
}
