use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "cadence", version, about = "Cadence scheduling engine CLI")]
struct Cli {
    /// Config file; defaults to ~/.config/cadence/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Occurrence materialization
    Materialize {
        #[command(subcommand)]
        action: commands::materialize::MaterializeAction,
    },
    /// Execution resolution
    Next {
        #[command(subcommand)]
        action: commands::next::NextAction,
    },
    /// Completion statistics
    Metrics(commands::metrics::MetricsArgs),
    /// Collapse duplicate occurrences
    Dedupe(commands::SnapshotArgs),
    /// Check a snapshot for inconsistencies
    Audit(commands::audit::AuditArgs),
    /// Seed recurrence rules from inline schedules
    Migrate(commands::migrate::MigrateArgs),
    /// Occurrence status updates
    Status {
        #[command(subcommand)]
        action: commands::status::StatusAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cadence=info,cadence_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Materialize { action } => {
            commands::load_config(config_path).and_then(|config| commands::materialize::run(action, &config))
        }
        Commands::Next { action } => commands::next::run(action),
        Commands::Metrics(args) => commands::metrics::run(args),
        Commands::Dedupe(args) => commands::dedupe::run(args),
        Commands::Audit(args) => commands::audit::run(args),
        Commands::Migrate(args) => {
            commands::load_config(config_path).and_then(|config| commands::migrate::run(args, &config))
        }
        Commands::Status { action } => commands::status::run(action),
        Commands::Config { action } => commands::config::run(action, config_path),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
