//! Check-config command - Validate configuration offline

use std::path::Path;

use clap::Args;
use serde::Serialize;

use crate::config::{Backend, Config};
use crate::error::{CliError, CliResult};
use crate::output::{print_header, print_json, print_key_value, print_success, print_warning};

/// Arguments for the check-config command
#[derive(Args, Debug, Default)]
pub struct CheckConfigArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// JSON output for check-config
#[derive(Debug, Serialize)]
pub struct CheckConfigOutput {
    pub path: String,
    pub valid: bool,
    pub problems: Vec<String>,
    pub warnings: Vec<String>,
}

/// Execute the check-config command. Makes no network calls.
pub fn execute(args: CheckConfigArgs, path: &Path) -> CliResult<()> {
    let mut config = Config::read(path)?;
    config.apply_env_from(|key| std::env::var(key).ok());
    let output = check(&config, path);

    if args.json {
        print_json(&output)?;
    } else {
        print_summary(&config, &output);
    }

    if output.valid {
        Ok(())
    } else {
        Err(CliError::Config(format!(
            "{} problem(s) in {}",
            output.problems.len(),
            output.path
        )))
    }
}

/// Problems and warnings for a parsed configuration.
#[must_use]
pub fn check(config: &Config, path: &Path) -> CheckConfigOutput {
    let problems = config.problems();
    let mut warnings = Vec::new();

    if config.entra.client_secret.is_none() {
        warnings.push("no client secret; sync and run will fail".to_string());
    }
    if config.local.backend == Backend::Memory {
        warnings.push("memory backend: accounts and queued work are lost on exit".to_string());
    }
    if config.mapping.fields.is_empty() {
        warnings.push("mapping.fields is empty; accounts get no custom fields".to_string());
    }

    CheckConfigOutput {
        path: path.display().to_string(),
        valid: problems.is_empty(),
        problems,
        warnings,
    }
}

fn print_summary(config: &Config, output: &CheckConfigOutput) {
    print_header("Configuration");
    print_key_value("file", &output.path);
    print_key_value("tenant", &config.entra.connection.tenant_id);
    print_key_value("backend", &config.local.backend.to_string());
    print_key_value("local fields", &config.local.fields.fields().len().to_string());
    print_key_value("field mappings", &config.mapping.fields.len().to_string());
    print_key_value("initial status", &config.mapping.initial_status.to_string());
    print_key_value(
        "schedule",
        &if config.sync.cron_enabled {
            format!("every {}s", config.sync.interval_secs)
        } else {
            "disabled".to_string()
        },
    );

    for warning in &output.warnings {
        print_warning(warning);
    }
    for problem in &output.problems {
        eprintln!("  - {problem}");
    }
    if output.valid {
        print_success("Configuration is valid");
    }
}
