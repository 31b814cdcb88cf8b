use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use orchard_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "orchard-cli", version, about = "Orchard focus and unlock engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Focus session control
    Focus {
        #[command(subcommand)]
        action: commands::focus::FocusAction,
    },
    /// Fruit balance and ledger
    Rewards {
        #[command(subcommand)]
        action: commands::rewards::RewardsAction,
    },
    /// Temporary app unlocks
    Unlock {
        #[command(subcommand)]
        action: commands::unlock::UnlockAction,
    },
    /// Unlock economy settings
    Settings {
        #[command(subcommand)]
        action: commands::settings::SettingsAction,
    },
    /// Shield copy and deep links
    Shield {
        #[command(subcommand)]
        action: commands::shield::ShieldAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Stored engine state
    State {
        #[command(subcommand)]
        action: commands::state::StateAction,
    },
    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_env("ORCHARD_LOG")
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load_or_default();
    init_logging(&config);

    let result = match cli.command {
        Commands::Focus { action } => commands::focus::run(action, &config),
        Commands::Rewards { action } => commands::rewards::run(action, &config),
        Commands::Unlock { action } => commands::unlock::run(action, &config),
        Commands::Settings { action } => commands::settings::run(action, &config),
        Commands::Shield { action } => commands::shield::run(action, &config),
        Commands::Config { action } => commands::config::run(action),
        Commands::State { action } => commands::state::run(action, &config),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "orchard-cli",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
