//! Run reports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::dispatch::DispatchReport;
use crate::queue::WorkCategory;

use super::PartitionSummary;

/// Records fetched from one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryCount {
    pub name: String,
    pub fetched: usize,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub source: DirectoryCount,
    pub target: DirectoryCount,
    pub partition: PartitionSummary,
    pub dispatch: DispatchReport,
}

impl RunReport {
    /// Every record was dispatched (or was already queued).
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.dispatch.has_failures()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Reconciliation run {}", self.run_id)?;
        writeln!(
            f,
            "  fetched:  {} from {}, {} from {}",
            self.source.fetched, self.source.name, self.target.fetched, self.target.name
        )?;
        writeln!(
            f,
            "  partition: {} only in {}, {} only in {}, {} in both",
            self.partition.only_in_source,
            self.source.name,
            self.partition.only_in_target,
            self.target.name,
            self.partition.in_both
        )?;
        if self.partition.superseded > 0 || self.partition.rejected > 0 {
            writeln!(
                f,
                "  data quality: {} superseded duplicates, {} rejected blank keys",
                self.partition.superseded, self.partition.rejected
            )?;
        }
        for category in WorkCategory::ALL {
            let counts = self.dispatch.category(category);
            writeln!(
                f,
                "  {category}: {} enqueued, {} already queued, {} failed",
                counts.enqueued, counts.duplicates, counts.failed
            )?;
        }
        for error in &self.dispatch.errors {
            writeln!(f, "  error: {error}")?;
        }
        write!(f, "  duration: {} ms", self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchError;

    fn report() -> RunReport {
        let now = Utc::now();
        RunReport {
            run_id: Uuid::nil(),
            started_at: now,
            finished_at: now,
            duration_ms: 12,
            source: DirectoryCount {
                name: "entra".into(),
                fetched: 3,
            },
            target: DirectoryCount {
                name: "local".into(),
                fetched: 2,
            },
            partition: PartitionSummary {
                only_in_source: 2,
                only_in_target: 1,
                in_both: 1,
                superseded: 0,
                rejected: 0,
            },
            dispatch: DispatchReport::default(),
        }
    }

    #[test]
    fn test_display_lists_every_category() {
        let text = report().to_string();
        assert!(text.contains("3 from entra, 2 from local"));
        assert!(text.contains("2 only in entra, 1 only in local, 1 in both"));
        assert!(text.contains("create_local_user: 0 enqueued"));
        assert!(text.contains("review_orphaned_local_user"));
        assert!(text.contains("reconcile_common_user"));
        assert!(!text.contains("data quality"));
    }

    #[test]
    fn test_failures_mark_report_unsuccessful() {
        let mut report = report();
        assert!(report.is_success());

        report.dispatch.errors.push(DispatchError {
            category: WorkCategory::CreateLocalUser,
            identity_key: "a@x.com".into(),
            message: "Queue is full (capacity 1)".into(),
            retryable: true,
        });
        assert!(!report.is_success());
        assert!(report.to_string().contains("error: Failed to enqueue"));
    }

    #[test]
    fn test_serializes_to_json() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["source"]["fetched"], 3);
        assert_eq!(json["partition"]["in_both"], 1);
        assert!(json["dispatch"]["categories"]["create_local_user"].is_object());
    }
}
