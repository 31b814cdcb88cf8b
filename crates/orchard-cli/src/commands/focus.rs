use chrono::{DateTime, Utc};
use clap::Subcommand;
use orchard_core::Config;

use super::{open_host, print_json, print_outcome, CliResult};

#[derive(Subcommand)]
pub enum FocusAction {
    /// Start a focus session now
    Start {
        /// Planned minutes (0 for open-ended)
        #[arg(long, default_value = "25")]
        minutes: u32,
        /// Tag to file the session under
        #[arg(long)]
        tag: Option<String>,
        /// What the session is for
        #[arg(long)]
        description: Option<String>,
    },
    /// Schedule a session for later
    Schedule {
        /// Start time (RFC 3339)
        #[arg(long)]
        at: DateTime<Utc>,
        /// Planned minutes
        #[arg(long, default_value = "25")]
        minutes: u32,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Begin the scheduled session
    Begin,
    /// Pause the running session
    Pause,
    /// Resume the paused session
    Resume,
    /// Finish the session and collect its fruits
    Complete,
    /// Abandon the session without reward
    Cancel,
    /// Show elapsed and remaining time
    Status,
    /// Show finished sessions, newest first
    History {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

pub fn run(action: FocusAction, config: &Config) -> CliResult {
    let mut host = open_host(config)?;
    match action {
        FocusAction::Start {
            minutes,
            tag,
            description,
        } => print_outcome(&host.run(|e| e.start_focus(minutes, tag, description))?),
        FocusAction::Schedule {
            at,
            minutes,
            tag,
            description,
        } => print_outcome(&host.run(|e| e.schedule_focus(at, minutes, tag, description))?),
        FocusAction::Begin => print_outcome(&host.run(|e| e.begin_scheduled())?),
        FocusAction::Pause => print_outcome(&host.run(|e| e.pause_focus())?),
        FocusAction::Resume => print_outcome(&host.run(|e| e.resume_focus())?),
        FocusAction::Complete => print_outcome(&host.run(|e| e.complete_focus())?),
        FocusAction::Cancel => print_outcome(&host.run(|e| e.cancel_focus())?),
        FocusAction::Status => {
            let engine = host.engine();
            print_json(&serde_json::json!({
                "session": engine.current_session(),
                "timing": engine.focus_timing(),
            }))
        }
        FocusAction::History { limit } => {
            let history: Vec<_> = host
                .engine()
                .state()
                .focus
                .history()
                .iter()
                .rev()
                .take(limit)
                .collect();
            print_json(&history)
        }
    }
}
