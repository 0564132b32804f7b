//! CLI error types and exit codes

use thiserror::Error;

use entrasync_connector::error::StoreError;
use entrasync_connector_entra::EntraError;
use entrasync_db::DbError;
use entrasync_provisioning::queue::QueueError;
use entrasync_provisioning::reconciliation::ReconciliationError;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General or configuration error
/// - 3: Directory fetch failed (network or authentication)
/// - 4: Validation error
/// - 5: Dispatch or queue error
/// - 6: A reconciliation run is already in progress
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Directory fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Dispatch incomplete: {0}")]
    Dispatch(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("A reconciliation run is already in progress")]
    AlreadyRunning,

    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Database(_) | CliError::Io(_) => 1,
            CliError::Fetch(_) => 3,
            CliError::Validation(_) => 4,
            CliError::Dispatch(_) | CliError::Queue(_) => 5,
            CliError::AlreadyRunning => 6,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    /// Get a suggested action for this error
    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => Some("Run 'entrasync check-config' to see every problem."),
            CliError::Fetch(_) => {
                Some("Check the tenant id, client id and ENTRASYNC_CLIENT_SECRET, then retry.")
            }
            CliError::Dispatch(_) => {
                Some("Nothing was lost; the next 'entrasync sync' enqueues the missing items.")
            }
            CliError::AlreadyRunning => Some("Wait for the current run to finish."),
            _ => None,
        }
    }
}

impl From<ReconciliationError> for CliError {
    fn from(e: ReconciliationError) -> Self {
        match e {
            ReconciliationError::AlreadyRunning => CliError::AlreadyRunning,
            ReconciliationError::Fetch { .. } => CliError::Fetch(e.to_string()),
            ReconciliationError::DuplicateKeys(_) => CliError::Validation(e.to_string()),
            ReconciliationError::Lock(msg) => CliError::Database(msg),
        }
    }
}

impl From<QueueError> for CliError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::InvalidConfig(msg) => CliError::Config(msg),
            other => CliError::Queue(other.to_string()),
        }
    }
}

impl From<DbError> for CliError {
    fn from(e: DbError) -> Self {
        CliError::Database(e.to_string())
    }
}

impl From<EntraError> for CliError {
    fn from(e: EntraError) -> Self {
        CliError::Config(format!("Entra ID: {e}"))
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Database(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(format!("JSON error: {}", e))
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(e: serde_yaml::Error) -> Self {
        CliError::Config(format!("YAML error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entrasync_connector::error::FetchError;
    use entrasync_provisioning::reconciliation::{DuplicateKeyError, Side};

    #[test]
    fn test_exit_code_config_error() {
        assert_eq!(CliError::Config("test".to_string()).exit_code(), 1);
    }

    #[test]
    fn test_exit_code_fetch_error() {
        let err: CliError = ReconciliationError::Fetch {
            directory: "entra".into(),
            source: FetchError::Auth("invalid_client".into()),
        }
        .into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("invalid_client"));
    }

    #[test]
    fn test_exit_code_duplicate_keys() {
        let err: CliError = ReconciliationError::from(DuplicateKeyError {
            side: Side::Source,
            keys: vec!["a@x.com".into()],
        })
        .into();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_exit_code_queue_errors() {
        assert_eq!(CliError::Dispatch("1 failed".into()).exit_code(), 5);
        let err: CliError = QueueError::Unavailable("down".into()).into();
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_exit_code_already_running() {
        let err: CliError = ReconciliationError::AlreadyRunning.into();
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_invalid_queue_config_is_config_error() {
        let err: CliError = QueueError::InvalidConfig("max_attempts".into()).into();
        assert_eq!(err.exit_code(), 1);
    }
}
