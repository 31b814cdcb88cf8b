use std::error::Error;

use chrono::{DateTime, FixedOffset, Utc};
use orchard_core::{
    ChannelBridge, Clock, Config, Database, Host, LoadSource, ManualClock, Outcome, SystemClock,
};
use serde::Serialize;

pub mod config;
pub mod focus;
pub mod rewards;
pub mod settings;
pub mod shield;
pub mod state;
pub mod unlock;

pub type CliResult = Result<(), Box<dyn Error>>;
pub type CliHost = Host<Database, ChannelBridge<Database>, HostClock>;

/// Wall clock, or a pinned instant when `ORCHARD_NOW` is set.
pub enum HostClock {
    System(SystemClock),
    Pinned(ManualClock),
}

impl HostClock {
    pub fn from_env() -> Result<Self, Box<dyn Error>> {
        match std::env::var("ORCHARD_NOW") {
            Ok(raw) => {
                let at = DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| format!("invalid ORCHARD_NOW '{raw}': {e}"))?;
                Ok(HostClock::Pinned(ManualClock::with_offset(
                    at.with_timezone(&Utc),
                    *at.offset(),
                )))
            }
            Err(_) => Ok(HostClock::System(SystemClock)),
        }
    }
}

impl Clock for HostClock {
    fn now(&self) -> DateTime<Utc> {
        match self {
            HostClock::System(c) => c.now(),
            HostClock::Pinned(c) => c.now(),
        }
    }

    fn utc_offset_at(&self, at: DateTime<Utc>) -> FixedOffset {
        match self {
            HostClock::System(c) => c.utc_offset_at(at),
            HostClock::Pinned(c) => c.utc_offset_at(at),
        }
    }
}

/// Open the engine over the on-disk databases and reconcile it.
pub fn open_host(config: &Config) -> Result<CliHost, Box<dyn Error>> {
    let host = Host::open(
        Database::open()?,
        ChannelBridge::new(Database::open_shared()?),
        HostClock::from_env()?,
        config.engine_config(),
        config.shield.clone(),
    );
    tracing::debug!(source = ?host.load_report().source, "engine opened");

    if let LoadSource::FellBack { reason, backup_key } = &host.load_report().source {
        eprintln!(
            "warning: stored state was unusable ({reason}); starting fresh{}",
            backup_key
                .as_deref()
                .map(|k| format!(", original kept under {k}"))
                .unwrap_or_default()
        );
    }
    if let Some(link) = &host.startup().value.deep_link {
        eprintln!("opened from shield link: {}", serde_json::to_string(link)?);
    }
    for warning in &host.startup().warnings {
        eprintln!("warning: {}", serde_json::to_string(warning)?);
    }
    Ok(host)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the value; warnings go to stderr.
pub fn print_outcome<T: Serialize>(outcome: &Outcome<T>) -> CliResult {
    for warning in &outcome.warnings {
        eprintln!("warning: {}", serde_json::to_string(warning)?);
    }
    print_json(&outcome.value)
}
