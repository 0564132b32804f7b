//! Integration tests for national cloud endpoint selection.

#![cfg(feature = "integration")]

use entrasync_connector_entra::{EntraCloudEnvironment, EntraConfig, EntraDirectory, EntraCredentials};

#[test]
fn test_commercial_cloud_endpoints() {
    let env = EntraCloudEnvironment::Commercial;
    assert_eq!(env.login_endpoint(), "https://login.microsoftonline.com");
    assert_eq!(env.graph_endpoint(), "https://graph.microsoft.com");
}

#[test]
fn test_china_cloud_endpoints() {
    let env = EntraCloudEnvironment::China;
    assert_eq!(env.login_endpoint(), "https://login.chinacloudapi.cn");
    assert_eq!(env.graph_endpoint(), "https://microsoftgraph.chinacloudapi.cn");
}

#[test]
fn test_token_url_per_cloud() {
    let config = EntraConfig::builder()
        .tenant_id("test-tenant-id")
        .cloud(EntraCloudEnvironment::UsGovernment)
        .build()
        .unwrap();
    assert_eq!(
        config.token_url(),
        "https://login.microsoftonline.us/test-tenant-id/oauth2/v2.0/token"
    );
    assert_eq!(config.scope(), "https://graph.microsoft.us/.default");
}

#[test]
fn test_users_query_targets_cloud_graph_host() {
    let config = EntraConfig::builder()
        .tenant_id("t")
        .cloud(EntraCloudEnvironment::China)
        .build()
        .unwrap();
    let directory = EntraDirectory::new(config, EntraCredentials::new("id", "secret")).unwrap();
    assert!(directory
        .users_url()
        .starts_with("https://microsoftgraph.chinacloudapi.cn/v1.0/users?"));
}

#[test]
fn test_cloud_parses_from_config_names() {
    let cloud: EntraCloudEnvironment = serde_json::from_str("\"us_government\"").unwrap();
    assert_eq!(cloud, EntraCloudEnvironment::UsGovernment);
}
