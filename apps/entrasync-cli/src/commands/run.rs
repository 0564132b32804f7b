//! Run command - Scheduled reconciliation plus a continuous worker

use std::sync::Arc;

use clap::Args;
use tracing::{info, warn};

use entrasync_provisioning::{ReconciliationScheduler, Shutdown};

use crate::app::{self, Backends};
use crate::config::Config;
use crate::error::CliResult;
use crate::output::{print_info, print_success, print_warning};

/// Arguments for the run command
#[derive(Args, Debug, Default)]
pub struct RunArgs {}

/// Execute the run command; returns after Ctrl-C.
pub async fn execute(_args: RunArgs, config: &Config) -> CliResult<()> {
    let backends = Backends::open(config).await?;
    if !backends.is_persistent() {
        print_warning("The memory backend loses queued work on exit.");
    }
    if !config.sync.cron_enabled {
        print_info("sync.cron_enabled is false; only queued work will be processed.");
    }

    let shutdown = Arc::new(Shutdown::new());
    let runner = Arc::new(app::runner(config, app::entra_directory(config)?, &backends));
    let scheduler = ReconciliationScheduler::new(runner, config.sync.clone(), shutdown.clone());
    let worker = app::worker(config, &backends, shutdown.clone());

    let signal = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupt received, shutting down"),
                Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C, shutting down"),
            }
            shutdown.trigger();
        })
    };

    let (runs, ()) = tokio::join!(scheduler.run(), worker.run());
    signal.abort();
    backends.close().await;

    print_success(&format!("Stopped after {runs} scheduled run(s)"));
    Ok(())
}
