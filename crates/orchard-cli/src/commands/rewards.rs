use chrono::Duration;
use clap::Subcommand;
use orchard_core::Config;

use super::{open_host, print_json, print_outcome, CliResult};

#[derive(Subcommand)]
pub enum RewardsAction {
    /// Show the fruit balance and totals
    Balance,
    /// Show recent transactions, newest first
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Credit fruits by hand
    Grant {
        amount: u64,
        #[arg(long, default_value = "Manual grant")]
        description: String,
    },
    /// Credit the reward for finishing a task
    Task {
        /// Task identifier
        id: String,
        /// Task title
        title: String,
    },
    /// Fold old transactions into the archived totals
    Archive {
        /// Keep this many days of transactions
        #[arg(long, default_value = "90")]
        keep_days: i64,
    },
}

pub fn run(action: RewardsAction, config: &Config) -> CliResult {
    let mut host = open_host(config)?;
    match action {
        RewardsAction::Balance => {
            let ledger = &host.engine().state().rewards;
            print_json(&serde_json::json!({
                "balance": ledger.balance(),
                "totalEarned": ledger.total_earned(),
                "totalSpent": ledger.total_spent(),
                "archived": ledger.archived(),
            }))
        }
        RewardsAction::History { limit } => {
            let recent: Vec<_> = host.engine().state().rewards.recent(limit).collect();
            print_json(&recent)
        }
        RewardsAction::Grant {
            amount,
            description,
        } => print_outcome(&host.run(|e| e.grant(amount, &description))?),
        RewardsAction::Task { id, title } => {
            print_outcome(&host.run(|e| e.award_task_completion(&id, &title))?)
        }
        RewardsAction::Archive { keep_days } => {
            let before = host.engine().now() - Duration::days(keep_days);
            print_outcome(&host.run(|e| e.archive_transactions(before))?)
        }
    }
}
