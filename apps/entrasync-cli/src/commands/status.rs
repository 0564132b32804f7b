//! Status command - Queue depth and dead letters

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use uuid::Uuid;

use entrasync_provisioning::{CategoryStats, WorkCategory, WorkItem};

use crate::app::Backends;
use crate::config::{Backend, Config};
use crate::error::CliResult;
use crate::output::{print_count, print_header, print_json, print_key_value, print_warning};

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Dead-lettered items to list
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output for status
#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub backend: String,
    pub total_depth: u64,
    pub categories: BTreeMap<WorkCategory, CategoryStats>,
    pub flagged_for_review: usize,
    pub dead_letters: Vec<DeadLetterOutput>,
}

#[derive(Debug, Serialize)]
pub struct DeadLetterOutput {
    pub id: Uuid,
    pub category: WorkCategory,
    pub identity_key: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl From<WorkItem> for DeadLetterOutput {
    fn from(item: WorkItem) -> Self {
        Self {
            id: item.id,
            category: item.category,
            identity_key: item.identity_key,
            attempts: item.attempt_count,
            last_error: item.last_error,
            enqueued_at: item.enqueued_at,
        }
    }
}

/// Execute the status command
pub async fn execute(args: StatusArgs, config: &Config) -> CliResult<()> {
    let backends = Backends::open(config).await?;
    let output = collect(config.local.backend, &backends, args.limit).await;
    backends.close().await;
    let output = output?;

    if args.json {
        return print_json(&output);
    }

    if config.local.backend == Backend::Memory {
        print_warning("The memory backend starts empty; status reflects this process only.");
    }
    print_header("Work queues");
    print_key_value("backend", &output.backend);
    for (category, stats) in &output.categories {
        print_key_value(
            category.as_str(),
            &format!(
                "{} pending, {} in progress, {} completed, {} dead-lettered",
                stats.pending, stats.in_progress, stats.completed, stats.dead_lettered
            ),
        );
        if let Some(oldest) = stats.oldest_pending_at {
            print_key_value("  oldest pending", &oldest.to_rfc3339());
        }
    }
    print_count("queue depth", output.total_depth, false);
    print_count(
        "flagged for review",
        u64::try_from(output.flagged_for_review).unwrap_or(u64::MAX),
        false,
    );

    if !output.dead_letters.is_empty() {
        print_header("Dead letters");
        for dead in &output.dead_letters {
            print_key_value(
                &format!("{} {}", dead.category, dead.identity_key),
                &format!(
                    "{} attempt(s): {}",
                    dead.attempts,
                    dead.last_error.as_deref().unwrap_or("no error recorded")
                ),
            );
        }
    }
    Ok(())
}

/// Gather queue counts, review count and the newest dead letters.
pub async fn collect(backend: Backend, backends: &Backends, limit: usize) -> CliResult<StatusOutput> {
    let stats = backends.queue.stats().await?;
    let dead = backends.queue.dead_letters(None, limit).await?;
    let reviews = backends.reviews.list().await?;

    Ok(StatusOutput {
        backend: backend.to_string(),
        total_depth: stats.total_depth(),
        categories: stats.categories,
        flagged_for_review: reviews.len(),
        dead_letters: dead.into_iter().map(DeadLetterOutput::from).collect(),
    })
}
