//! Sync command - One reconciliation pass

use std::sync::Arc;

use clap::Args;
use serde::Serialize;
use tracing::info;

use entrasync_connector::traits::DirectorySource;
use entrasync_provisioning::reconciliation::RunReport;
use entrasync_provisioning::{DrainReport, Shutdown};

use crate::app::{self, Backends};
use crate::commands::drain::print_drain_report;
use crate::config::Config;
use crate::error::{CliError, CliResult};
use crate::output::{print_json, print_success, print_warning};

/// Arguments for the sync command
#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Process the queued work right after dispatching it
    /// (always done with the memory backend)
    #[arg(long)]
    pub drain: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// What one sync did.
#[derive(Debug, Serialize)]
pub struct SyncOutcome {
    pub report: RunReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain: Option<DrainReport>,
}

/// Execute the sync command
pub async fn execute(args: SyncArgs, config: &Config) -> CliResult<()> {
    let backends = Backends::open(config).await?;
    let source = app::entra_directory(config)?;
    let outcome = sync_with(config, source, &backends, args.drain).await;
    backends.close().await;
    let outcome = outcome?;

    if args.json {
        print_json(&outcome)?;
    } else {
        println!("{}", outcome.report);
        if let Some(drain) = &outcome.drain {
            print_drain_report(drain);
        }
    }

    finish(&outcome.report, args.json)
}

/// Reconcile `source` against the local store, then drain when asked to
/// or when queued work would not outlive the process.
pub async fn sync_with(
    config: &Config,
    source: Arc<dyn DirectorySource>,
    backends: &Backends,
    drain: bool,
) -> CliResult<SyncOutcome> {
    let runner = app::runner(config, source, backends);
    let report = runner.run().await?;

    let drain = if drain || !backends.is_persistent() {
        info!(run_id = %report.run_id, "Draining queued work");
        let worker = app::worker(config, backends, Arc::new(Shutdown::new()));
        Some(worker.drain().await?)
    } else {
        None
    };

    Ok(SyncOutcome { report, drain })
}

/// Map the dispatch result onto the exit status.
pub fn finish(report: &RunReport, quiet: bool) -> CliResult<()> {
    let failed = report.dispatch.total_failed();
    if failed > 0 {
        if !quiet {
            print_warning("Some records could not be enqueued");
        }
        return Err(CliError::Dispatch(format!(
            "{failed} record(s) could not be enqueued in run {}",
            report.run_id
        )));
    }
    if !quiet {
        print_success("Reconciliation dispatched");
    }
    Ok(())
}
