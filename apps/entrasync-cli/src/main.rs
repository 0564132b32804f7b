//! entrasync - Reconcile Microsoft Entra ID users with a local user store
//!
//! This CLI enables administrators to:
//! - Run one reconciliation pass and queue the differences
//! - Process queued work (account creation, orphan review)
//! - Run scheduled reconciliation with a continuous worker
//! - Inspect queue depth and dead letters
//! - Validate configuration and apply database migrations

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use entrasync_cli::commands;
use entrasync_cli::config::{self, Config};
use entrasync_cli::error::CliResult;
use entrasync_cli::logging::init_logging;

/// entrasync - Entra ID to local user reconciliation
#[derive(Parser)]
#[command(name = "entrasync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file [default: config/entrasync.yaml]
    #[arg(long, short, global = true, env = "ENTRASYNC_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass and queue the differences
    Sync(commands::sync::SyncArgs),

    /// Process queued work items for a bounded time
    Drain(commands::drain::DrainArgs),

    /// Schedule reconciliation and process queued work until interrupted
    Run(commands::run::RunArgs),

    /// Show queue depth and dead-lettered items
    Status(commands::status::StatusArgs),

    /// Validate the configuration without contacting any service
    CheckConfig(commands::check_config::CheckConfigArgs),

    /// Apply PostgreSQL migrations
    Migrate(commands::migrate::MigrateArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let path = config::config_path(cli.config);

    // check-config lists every problem instead of failing inside load().
    let command = match cli.command {
        Commands::CheckConfig(args) => return commands::check_config::execute(args, &path),
        command => command,
    };

    let config = Config::load(&path)?;
    init_logging(&config.logging.filter, config.logging.format)?;

    match command {
        Commands::Sync(args) => commands::sync::execute(args, &config).await,
        Commands::Drain(args) => commands::drain::execute(args, &config).await,
        Commands::Run(args) => commands::run::execute(args, &config).await,
        Commands::Status(args) => commands::status::execute(args, &config).await,
        Commands::Migrate(args) => commands::migrate::execute(args, &config).await,
        Commands::CheckConfig(args) => commands::check_config::execute(args, &path),
    }
}
