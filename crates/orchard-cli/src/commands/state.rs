use clap::Subcommand;
use orchard_core::{Config, Database, StateStore};

use super::{open_host, print_json, print_outcome, CliResult};

#[derive(Subcommand)]
pub enum StateAction {
    /// Print the whole engine state
    Show,
    /// How the state was loaded, with any repair warnings
    Report,
    /// Settle overdue sessions and expired unlocks, then print a snapshot
    Tick,
    /// List backups of unreadable state
    Backups,
    /// Print a stored backup
    Backup {
        /// Backup key, as listed by `state backups`
        key: String,
    },
}

pub fn run(action: StateAction, config: &Config) -> CliResult {
    match action {
        StateAction::Show => {
            let host = open_host(config)?;
            print_json(host.engine().state())
        }
        StateAction::Report => {
            let host = open_host(config)?;
            print_json(&serde_json::json!({
                "load": host.load_report(),
                "startup": host.startup(),
                "durable": host.is_durable(),
            }))
        }
        StateAction::Tick => {
            let mut host = open_host(config)?;
            print_outcome(&host.run(|e| e.tick())?)
        }
        StateAction::Backups => {
            let db = Database::open()?;
            print_json(&db.kv_keys("engine_state.corrupt.")?)
        }
        StateAction::Backup { key } => {
            let store = StateStore::new(Database::open()?);
            match store.backup(&key)? {
                Some(raw) => {
                    println!("{raw}");
                    Ok(())
                }
                None => Err(format!("no backup under {key}").into()),
            }
        }
    }
}
