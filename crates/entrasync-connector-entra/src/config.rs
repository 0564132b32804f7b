//! Entra ID connection settings.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::{EntraError, EntraResult};

/// National cloud the tenant lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntraCloudEnvironment {
    #[default]
    Commercial,
    UsGovernment,
    China,
}

impl EntraCloudEnvironment {
    /// Azure AD login host for the cloud.
    #[must_use]
    pub fn login_endpoint(&self) -> &'static str {
        match self {
            Self::Commercial => "https://login.microsoftonline.com",
            Self::UsGovernment => "https://login.microsoftonline.us",
            Self::China => "https://login.chinacloudapi.cn",
        }
    }

    /// Microsoft Graph host for the cloud.
    #[must_use]
    pub fn graph_endpoint(&self) -> &'static str {
        match self {
            Self::Commercial => "https://graph.microsoft.com",
            Self::UsGovernment => "https://graph.microsoft.us",
            Self::China => "https://microsoftgraph.chinacloudapi.cn",
        }
    }
}

/// App registration credentials for the client credentials flow.
#[derive(Debug, Clone)]
pub struct EntraCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

impl EntraCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
        }
    }
}

/// Tenant and query settings for reading users from Microsoft Graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntraConfig {
    pub tenant_id: String,

    #[serde(default)]
    pub cloud: EntraCloudEnvironment,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// `$top` for each users page (Graph caps this at 999).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Optional OData `$filter` applied to the users query.
    #[serde(default)]
    pub user_filter: Option<String>,

    /// Budget for a complete paginated fetch.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Retries for 502/503/504 responses.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Replaces the cloud's Graph host (tests, proxies).
    #[serde(default)]
    pub graph_base_url: Option<String>,

    /// Replaces the cloud's login host.
    #[serde(default)]
    pub login_base_url: Option<String>,
}

fn default_api_version() -> String {
    "v1.0".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    5
}

impl EntraConfig {
    /// Config for `tenant_id` with every other setting at its default.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            cloud: EntraCloudEnvironment::default(),
            api_version: default_api_version(),
            page_size: default_page_size(),
            user_filter: None,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_retries: default_max_retries(),
            graph_base_url: None,
            login_base_url: None,
        }
    }

    /// Start a builder.
    #[must_use]
    pub fn builder() -> EntraConfigBuilder {
        EntraConfigBuilder::default()
    }

    /// Check the settings without touching the network.
    pub fn validate(&self) -> EntraResult<()> {
        if self.tenant_id.trim().is_empty() {
            return Err(EntraError::Config("tenant_id is required".to_string()));
        }
        if !(1..=999).contains(&self.page_size) {
            return Err(EntraError::Config(format!(
                "page_size must be between 1 and 999, got {}",
                self.page_size
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(EntraError::Config(
                "fetch_timeout_secs must be > 0".to_string(),
            ));
        }
        for base in [&self.graph_base_url, &self.login_base_url].into_iter().flatten() {
            url::Url::parse(base)?;
        }
        Ok(())
    }

    /// Graph host, honouring the override.
    #[must_use]
    pub fn graph_host(&self) -> String {
        self.graph_base_url
            .clone()
            .unwrap_or_else(|| self.cloud.graph_endpoint().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Login host, honouring the override.
    #[must_use]
    pub fn login_host(&self) -> String {
        self.login_base_url
            .clone()
            .unwrap_or_else(|| self.cloud.login_endpoint().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Token endpoint for the tenant.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.login_host(), self.tenant_id)
    }

    /// Client credentials scope. Always the cloud's Graph resource, even
    /// when the host is overridden.
    #[must_use]
    pub fn scope(&self) -> String {
        format!("{}/.default", self.cloud.graph_endpoint())
    }
}

/// Builder for [`EntraConfig`].
#[derive(Debug, Default)]
pub struct EntraConfigBuilder {
    tenant_id: Option<String>,
    cloud: Option<EntraCloudEnvironment>,
    page_size: Option<u32>,
    user_filter: Option<String>,
    fetch_timeout_secs: Option<u64>,
    graph_base_url: Option<String>,
    login_base_url: Option<String>,
}

impl EntraConfigBuilder {
    #[must_use]
    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    #[must_use]
    pub fn cloud(mut self, cloud: EntraCloudEnvironment) -> Self {
        self.cloud = Some(cloud);
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    #[must_use]
    pub fn user_filter(mut self, filter: impl Into<String>) -> Self {
        self.user_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = Some(secs);
        self
    }

    /// Point both Graph and login at one host (a mock server).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.graph_base_url = Some(url.clone());
        self.login_base_url = Some(url);
        self
    }

    /// Build and validate.
    pub fn build(self) -> EntraResult<EntraConfig> {
        let tenant_id = self
            .tenant_id
            .ok_or_else(|| EntraError::Config("tenant_id is required".to_string()))?;
        let mut config = EntraConfig::new(tenant_id);
        if let Some(cloud) = self.cloud {
            config.cloud = cloud;
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        if let Some(secs) = self.fetch_timeout_secs {
            config.fetch_timeout_secs = secs;
        }
        config.user_filter = self.user_filter;
        config.graph_base_url = self.graph_base_url;
        config.login_base_url = self.login_base_url;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloud_endpoints() {
        let cloud = EntraCloudEnvironment::UsGovernment;
        assert_eq!(cloud.login_endpoint(), "https://login.microsoftonline.us");
        assert_eq!(cloud.graph_endpoint(), "https://graph.microsoft.us");
        assert_eq!(
            EntraCloudEnvironment::China.graph_endpoint(),
            "https://microsoftgraph.chinacloudapi.cn"
        );
    }

    #[test]
    fn test_builder_requires_tenant() {
        assert!(matches!(
            EntraConfig::builder().build(),
            Err(EntraError::Config(_))
        ));
    }

    #[test]
    fn test_builder_validates_page_size() {
        let result = EntraConfig::builder().tenant_id("t").page_size(0).build();
        assert!(result.is_err());
        let result = EntraConfig::builder().tenant_id("t").page_size(1000).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_and_token_url() {
        let config = EntraConfig::builder()
            .tenant_id("tenant-1")
            .base_url("http://127.0.0.1:9999/")
            .build()
            .unwrap();
        assert_eq!(config.graph_host(), "http://127.0.0.1:9999");
        assert_eq!(
            config.token_url(),
            "http://127.0.0.1:9999/tenant-1/oauth2/v2.0/token"
        );
        assert_eq!(config.scope(), "https://graph.microsoft.com/.default");
    }

    #[test]
    fn test_invalid_override_url() {
        let mut config = EntraConfig::new("t");
        config.graph_base_url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(EntraError::Url(_))));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: EntraConfig = serde_json::from_str(r#"{"tenant_id":"t","cloud":"china"}"#)
            .unwrap();
        assert_eq!(config.cloud, EntraCloudEnvironment::China);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.fetch_timeout_secs, 120);
        assert_eq!(config.api_version, "v1.0");
    }
}
