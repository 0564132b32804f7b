//! Configuration loading tests.

use std::io::Write;

use secrecy::ExposeSecret;
use tempfile::NamedTempFile;

use entrasync_cli::commands::check_config;
use entrasync_cli::config::{Backend, Config, LogFormat, CLIENT_SECRET_ENV, DATABASE_URL_ENV};
use entrasync_connector::account::LocalIdentityField;
use entrasync_connector::mapping::AccountStatus;
use entrasync_provisioning::reconciliation::DuplicateKeyPolicy;

const MINIMAL: &str = r#"
entra:
  tenant_id: contoso.onmicrosoft.com
  client_id: 11111111-2222-3333-4444-555555555555
"#;

const FULL: &str = r#"
entra:
  tenant_id: contoso.onmicrosoft.com
  client_id: 11111111-2222-3333-4444-555555555555
  cloud: us_government
  page_size: 250
  user_filter: "accountEnabled eq true"
local:
  backend: postgres
  database_url: postgres://entrasync@localhost/entrasync
  identity_field: name
  excluded_names: [admin, root]
  fields:
    - { name: field_first_name, multi_valued: false }
    - { name: field_phones, multi_valued: true }
mapping:
  fields:
    - { source: givenName, target: field_first_name }
    - { source: businessPhones, target: field_phones }
  roles: [editor]
  initial_status: active
  notify_on_activation: true
sync:
  cron_enabled: true
  interval_secs: 900
  duplicate_policy: reject
queue:
  max_attempts: 3
worker:
  concurrency: 2
logging:
  format: json
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn no_env(_: &str) -> Option<String> {
    None
}

// =============================================================================
// Parsing and defaults
// =============================================================================

#[test]
fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml(MINIMAL).unwrap();

    assert_eq!(config.local.backend, Backend::Memory);
    assert_eq!(config.local.identity_field, LocalIdentityField::Mail);
    assert_eq!(config.local.excluded_names, vec!["admin".to_string()]);
    assert_eq!(config.mapping.initial_status, AccountStatus::Blocked);
    assert_eq!(config.mapping.multi_value_separator, ", ");
    assert!(!config.sync.cron_enabled);
    assert_eq!(config.sync.interval_secs, 3600);
    assert_eq!(config.queue.max_attempts, 5);
    assert_eq!(config.worker.batch_size, 10);
    assert_eq!(config.entra.connection.page_size, 100);
    assert_eq!(config.logging.filter, "info,entrasync=debug");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(config.validate().is_ok());
}

#[test]
fn test_full_config_round_trips_every_section() {
    let config = Config::from_yaml(FULL).unwrap();

    assert_eq!(config.entra.connection.page_size, 250);
    assert_eq!(
        config.entra.connection.user_filter.as_deref(),
        Some("accountEnabled eq true")
    );
    assert_eq!(config.local.backend, Backend::Postgres);
    assert_eq!(config.local.identity_field, LocalIdentityField::Name);
    assert!(config.local.fields.is_multi_valued("field_phones"));
    assert_eq!(config.mapping.initial_status, AccountStatus::Active);
    assert!(config.mapping.should_notify());
    assert_eq!(config.sync.duplicate_policy, DuplicateKeyPolicy::Reject);
    assert_eq!(config.queue.max_attempts, 3);
    assert_eq!(config.worker.concurrency, 2);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_client_id_is_parse_error() {
    let err = Config::from_yaml("entra:\n  tenant_id: contoso\n").unwrap_err();
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_unknown_status_is_rejected() {
    let yaml = format!("{MINIMAL}mapping:\n  initial_status: suspended\n");
    assert!(Config::from_yaml(&yaml).is_err());
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_validation_collects_every_problem() {
    let yaml = r#"
entra:
  tenant_id: ""
  client_id: " "
  page_size: 5000
local:
  backend: postgres
mapping:
  fields:
    - { source: givenName, target: field_missing }
sync:
  interval_secs: 0
queue:
  max_attempts: 0
"#;
    let config = Config::from_yaml(yaml).unwrap();
    let problems = config.problems();

    assert!(problems.iter().any(|p| p.contains("client_id")));
    assert!(problems.iter().any(|p| p.starts_with("entra:")));
    assert!(problems.iter().any(|p| p.contains("database_url")));
    assert!(problems.iter().any(|p| p.contains("field_missing")));
    assert!(problems.iter().any(|p| p.contains("interval_secs")));
    assert!(problems.iter().any(|p| p.contains("max_attempts")));

    let err = config.validate().unwrap_err();
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_reserved_mapping_target_is_rejected() {
    let yaml = format!("{MINIMAL}mapping:\n  fields:\n    - {{ source: mail, target: mail }}\n");
    let config = Config::from_yaml(&yaml).unwrap();
    assert!(config.problems().iter().any(|p| p.contains("mail")));
}

// =============================================================================
// Environment
// =============================================================================

#[test]
fn test_secret_and_database_url_come_from_env() {
    let yaml = format!("{MINIMAL}local:\n  backend: postgres\n");
    let mut config = Config::from_yaml(&yaml).unwrap();
    assert!(config.credentials().is_err());

    config.apply_env_from(|key| match key {
        k if k == CLIENT_SECRET_ENV => Some("s3cret".to_string()),
        k if k == DATABASE_URL_ENV => Some("postgres://localhost/entrasync".to_string()),
        _ => None,
    });

    let credentials = config.credentials().unwrap();
    assert_eq!(credentials.client_secret.expose_secret(), "s3cret");
    assert_eq!(config.database_url().unwrap(), "postgres://localhost/entrasync");
    assert!(config.validate().is_ok());
}

#[test]
fn test_file_values_win_over_env() {
    let yaml = format!("{MINIMAL}  client_secret: from-file\n");
    let mut config = Config::from_yaml(&yaml).unwrap();
    config.apply_env_from(|_| Some("from-env".to_string()));

    assert_eq!(
        config.credentials().unwrap().client_secret.expose_secret(),
        "from-file"
    );
}

#[test]
fn test_secret_is_not_printed_by_debug() {
    let yaml = format!("{MINIMAL}  client_secret: hunter2\n");
    let config = Config::from_yaml(&yaml).unwrap();
    assert!(!format!("{config:?}").contains("hunter2"));
}

// =============================================================================
// Files
// =============================================================================

#[test]
fn test_read_from_file() {
    let file = write_config(FULL);
    let mut config = Config::read(file.path()).unwrap();
    config.apply_env_from(no_env);
    assert_eq!(config.sync.interval_secs, 900);
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::read(&dir.path().join("absent.yaml")).unwrap_err();
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn test_check_config_reports_problems_and_warnings() {
    let file = write_config("entra:\n  tenant_id: contoso\n  client_id: \"\"\n");
    let mut config = Config::read(file.path()).unwrap();
    config.apply_env_from(no_env);

    let output = check_config::check(&config, file.path());
    assert!(!output.valid);
    assert_eq!(output.problems.len(), 1);
    assert!(output.warnings.iter().any(|w| w.contains("client secret")));
    assert!(output.warnings.iter().any(|w| w.contains("memory backend")));
}
