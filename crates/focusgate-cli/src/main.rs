use clap::{Parser, Subcommand};
use focusgate_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "focusgate", version, about = "FocusGate pomodoro timer and site blocker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Site blocker settings
    Blocker {
        #[command(subcommand)]
        action: commands::blocker::BlockerAction,
    },
    /// Daily statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run the background service, speaking line-delimited JSON on stdio
    Run {
        /// Keep all state in memory instead of the data directory
        #[arg(long)]
        ephemeral: bool,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_env("FOCUSGATE_LOG")
        .or_else(|_| EnvFilter::try_new(&config.log.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load_or_default();
    init_tracing(&config);

    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action, &config),
        Commands::Blocker { action } => commands::blocker::run(action, &config),
        Commands::Stats { action } => commands::stats::run(action, &config),
        Commands::Config { action } => commands::config::run(action),
        Commands::Run { ephemeral } => commands::run::run(ephemeral, config),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
