//! Configuration loading for the entrasync CLI

mod settings;

pub use settings::{Backend, Config, EntraSection, LocalSection, LogFormat, LoggingSection};

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use entrasync_connector_entra::EntraCredentials;

use crate::error::{CliError, CliResult};

/// Used when neither `--config` nor `ENTRASYNC_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/entrasync.yaml";

/// Environment variable holding the app registration secret.
pub const CLIENT_SECRET_ENV: &str = "ENTRASYNC_CLIENT_SECRET";

/// Environment variable holding the PostgreSQL connection string.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

impl Config {
    /// Read, parse and validate a configuration file, filling secrets from
    /// the process environment.
    pub fn load(path: &Path) -> CliResult<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Read and parse without touching the environment or validating.
    pub fn read(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> CliResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Fill values the file left out from `lookup` (normally the
    /// environment). Values present in the file win.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.entra.client_secret.is_none() {
            if let Some(secret) = lookup(CLIENT_SECRET_ENV).filter(|s| !s.is_empty()) {
                self.entra.client_secret = Some(SecretString::new(secret));
            }
        }
        if self.local.database_url.is_none() {
            self.local.database_url = lookup(DATABASE_URL_ENV).filter(|s| !s.is_empty());
        }
    }

    /// Check every section, reporting all problems at once.
    pub fn validate(&self) -> CliResult<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(CliError::Config(problems.join("; ")))
        }
    }

    /// Every configuration problem found, in file order.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.entra.client_id.trim().is_empty() {
            problems.push("entra.client_id is required".to_string());
        }
        if let Err(e) = self.entra.connection.validate() {
            problems.push(format!("entra: {e}"));
        }
        if self.local.backend == Backend::Postgres && self.local.database_url.is_none() {
            problems.push(format!(
                "local.database_url (or {DATABASE_URL_ENV}) is required for the postgres backend"
            ));
        }
        if let Err(errors) = self.mapping.validate(&self.local.fields) {
            problems.extend(errors.into_iter().map(|e| format!("mapping: {e}")));
        }
        if self.sync.interval_secs == 0 {
            problems.push("sync.interval_secs must be > 0".to_string());
        }
        if let Err(e) = self.queue.validate() {
            problems.push(format!("queue: {e}"));
        }
        if self.worker.batch_size == 0 {
            problems.push("worker.batch_size must be at least 1".to_string());
        }
        if self.worker.drain_budget_secs == 0 {
            problems.push("worker.drain_budget_secs must be > 0".to_string());
        }

        problems
    }

    /// Client credentials for Microsoft Graph.
    pub fn credentials(&self) -> CliResult<EntraCredentials> {
        let secret = self.entra.client_secret.clone().ok_or_else(|| {
            CliError::Config(format!(
                "entra.client_secret is not set; export {CLIENT_SECRET_ENV}"
            ))
        })?;
        Ok(EntraCredentials {
            client_id: self.entra.client_id.clone(),
            client_secret: secret,
        })
    }

    /// Connection string for the postgres backend.
    pub fn database_url(&self) -> CliResult<&str> {
        self.local.database_url.as_deref().ok_or_else(|| {
            CliError::Config(format!(
                "local.database_url (or {DATABASE_URL_ENV}) is not set"
            ))
        })
    }
}

/// Resolve the configuration path from the command line value.
#[must_use]
pub fn config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
