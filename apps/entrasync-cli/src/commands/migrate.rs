//! Migrate command - Apply PostgreSQL migrations

use clap::Args;

use entrasync_db::{run_migrations, DbPool};

use crate::config::{Backend, Config};
use crate::error::{CliError, CliResult};
use crate::output::print_success;

/// Arguments for the migrate command
#[derive(Args, Debug, Default)]
pub struct MigrateArgs {}

/// Execute the migrate command
pub async fn execute(_args: MigrateArgs, config: &Config) -> CliResult<()> {
    if config.local.backend != Backend::Postgres {
        return Err(CliError::Config(
            "migrate needs local.backend: postgres".to_string(),
        ));
    }

    let pool = DbPool::connect(config.database_url()?).await?;
    let result = run_migrations(&pool).await;
    pool.close().await;
    result?;

    print_success("Database schema is up to date");
    Ok(())
}
