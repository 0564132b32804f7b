//! Drain command - Process queued work for a bounded time

use std::sync::Arc;

use clap::Args;

use entrasync_provisioning::{DrainReport, Shutdown, WorkCategory};

use crate::app::{self, Backends};
use crate::config::Config;
use crate::error::CliResult;
use crate::output::{print_count, print_header, print_json, print_key_value, print_warning};

/// Arguments for the drain command
#[derive(Args, Debug, Default)]
pub struct DrainArgs {
    /// Override worker.drain_budget_secs
    #[arg(long, value_name = "SECS")]
    pub budget_secs: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the drain command
pub async fn execute(args: DrainArgs, config: &Config) -> CliResult<()> {
    let mut config = config.clone();
    if let Some(budget) = args.budget_secs {
        config.worker.drain_budget_secs = budget.max(1);
    }

    let backends = Backends::open(&config).await?;
    if !backends.is_persistent() && !args.json {
        print_warning("The memory backend keeps no work between runs; use 'entrasync sync'.");
    }

    let shutdown = Arc::new(Shutdown::new());
    let worker = app::worker(&config, &backends, shutdown);
    let report = worker.drain().await;
    backends.close().await;
    let report = report?;

    if args.json {
        print_json(&report)?;
    } else {
        print_drain_report(&report);
    }
    Ok(())
}

/// Human-readable per-category outcome counts.
pub fn print_drain_report(report: &DrainReport) {
    print_header("Queue drain");
    for category in WorkCategory::ALL {
        let counts = report.category(category);
        print_key_value(
            category.as_str(),
            &format!(
                "{} completed, {} retried, {} dead-lettered, {} unrecorded",
                counts.completed, counts.retried, counts.dead_lettered, counts.unrecorded
            ),
        );
    }
    print_count("released stale claims", report.released_stale, false);
    print_count("purged completed items", report.purged_completed, false);
    print_count("dead-lettered", report.total_dead_lettered(), true);
    print_key_value("duration", &format!("{} ms", report.duration_ms));
    if report.budget_exhausted {
        print_warning("Time budget ran out; remaining items stay queued.");
    }
}
