//! Configuration file sections.

use secrecy::SecretString;
use serde::Deserialize;

use entrasync_connector::account::LocalIdentityField;
use entrasync_connector::mapping::{FieldMappingConfig, LocalFieldSchema};
use entrasync_connector_entra::EntraConfig;
use entrasync_provisioning::queue::QueueConfig;
use entrasync_provisioning::reconciliation::SyncConfig;
use entrasync_provisioning::worker::WorkerConfig;

/// The whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub entra: EntraSection,

    #[serde(default)]
    pub local: LocalSection,

    #[serde(default)]
    pub mapping: FieldMappingConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// `entra:` app registration and Graph query settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EntraSection {
    pub client_id: String,

    /// Usually left out of the file and read from `ENTRASYNC_CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: Option<SecretString>,

    #[serde(flatten)]
    pub connection: EntraConfig,
}

/// Where local accounts live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Process memory; queued work does not survive the process.
    #[default]
    Memory,
    Postgres,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Memory => write!(f, "memory"),
            Backend::Postgres => write!(f, "postgres"),
        }
    }
}

/// `local:` user store settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalSection {
    #[serde(default)]
    pub backend: Backend,

    /// Falls back to `DATABASE_URL`.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub identity_field: LocalIdentityField,

    /// Account names never reconciled.
    #[serde(default = "default_excluded_names")]
    pub excluded_names: Vec<String>,

    /// Custom fields local accounts carry.
    #[serde(default)]
    pub fields: LocalFieldSchema,
}

fn default_excluded_names() -> Vec<String> {
    vec!["admin".to_string()]
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            database_url: None,
            identity_field: LocalIdentityField::default(),
            excluded_names: default_excluded_names(),
            fields: LocalFieldSchema::default(),
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `logging:` settings. `RUST_LOG` wins over `filter`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    "info,entrasync=debug".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}
