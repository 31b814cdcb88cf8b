use clap::Subcommand;
use orchard_core::{AppTokenSet, Config};

use super::{open_host, print_outcome, CliResult};

#[derive(Subcommand)]
pub enum UnlockAction {
    /// Spend fruits to let apps through for a while
    Request {
        /// Opaque app token (repeatable)
        #[arg(long = "app", required = true)]
        apps: Vec<String>,
        /// Minutes of access
        #[arg(long)]
        minutes: u32,
    },
    /// End an unlock early (no refund)
    End {
        /// Unlock id
        id: String,
    },
    /// List active unlocks with their remaining time
    List,
    /// How many unlocks are left today
    Remaining,
}

pub fn run(action: UnlockAction, config: &Config) -> CliResult {
    let mut host = open_host(config)?;
    match action {
        UnlockAction::Request { apps, minutes } => {
            let tokens = AppTokenSet::new(apps);
            print_outcome(&host.run(|e| e.request_unlock(tokens, minutes))?)
        }
        UnlockAction::End { id } => print_outcome(&host.run(|e| e.end_unlock_early(&id))?),
        UnlockAction::List => print_outcome(&host.run(|e| e.active_unlocks())?),
        UnlockAction::Remaining => print_outcome(&host.run(|e| e.remaining_unlocks_today())?),
    }
}
