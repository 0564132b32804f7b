//! Microsoft Graph API HTTP client with pagination and rate limiting.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::metrics::RateLimitMetrics;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::{EntraConfig, EntraError, EntraResult, TokenCache};

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
}

/// One page of a collection response.
#[derive(Debug, Deserialize)]
pub struct ODataResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Microsoft Graph API client.
#[derive(Debug)]
pub struct GraphClient {
    http_client: reqwest::Client,
    token_cache: Arc<TokenCache>,
    base_url: String,
    max_retries: u32,
    rate_limiter: Arc<RateLimiter>,
}

impl GraphClient {
    /// Creates a client for the configured cloud with default backoff.
    pub fn new(token_cache: Arc<TokenCache>, config: &EntraConfig) -> EntraResult<Self> {
        Self::with_rate_limit_config(token_cache, config, RateLimitConfig::default())
    }

    pub fn with_rate_limit_config(
        token_cache: Arc<TokenCache>,
        config: &EntraConfig,
        rate_limit_config: RateLimitConfig,
    ) -> EntraResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EntraError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            token_cache,
            base_url: format!("{}/{}", config.graph_host(), config.api_version),
            max_retries: config.max_retries,
            rate_limiter: Arc::new(RateLimiter::new(rate_limit_config)?),
        })
    }

    /// Base URL including the API version, e.g. `https://graph.microsoft.com/v1.0`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub async fn rate_limit_metrics(&self) -> RateLimitMetrics {
        self.rate_limiter.metrics().await
    }

    /// GET with token injection, throttling and transient-error retries.
    #[instrument(skip(self))]
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> EntraResult<T> {
        self.rate_limiter.before_request().await?;

        let mut throttle_attempts = 0u32;
        let mut transient_attempts = 0u32;
        let mut reauthenticated = false;

        loop {
            let token = self.token_cache.get_token().await?;
            let response = self
                .http_client
                .get(url)
                .bearer_auth(&token)
                .send()
                .await?;
            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                self.rate_limiter
                    .on_throttled(retry_after.as_deref(), throttle_attempts)
                    .await?;
                throttle_attempts += 1;
                continue;
            }

            if matches!(
                status,
                reqwest::StatusCode::BAD_GATEWAY
                    | reqwest::StatusCode::SERVICE_UNAVAILABLE
                    | reqwest::StatusCode::GATEWAY_TIMEOUT
            ) {
                self.rate_limiter
                    .on_transient(status.as_u16(), transient_attempts, self.max_retries)
                    .await?;
                transient_attempts += 1;
                continue;
            }

            // A token revoked server-side gets one fresh acquisition.
            if status == reqwest::StatusCode::UNAUTHORIZED && !reauthenticated {
                debug!("Graph rejected token, re-acquiring");
                self.token_cache.invalidate().await;
                reauthenticated = true;
                continue;
            }

            if status.is_success() {
                self.rate_limiter.on_success().await;
                let body = response.text().await?;
                return Ok(serde_json::from_str(&body)?);
            }

            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ODataError>(&body) {
                Ok(odata) => EntraError::GraphApi {
                    status: status.as_u16(),
                    code: odata.error.code,
                    message: odata.error.message,
                },
                Err(_) => EntraError::GraphApi {
                    status: status.as_u16(),
                    code: status.to_string(),
                    message: body,
                },
            });
        }
    }

    /// Walks `@odata.nextLink` until exhausted, handing each page to
    /// `callback`. Any failing page aborts the walk.
    #[instrument(skip(self, callback))]
    pub async fn get_paginated<T, F>(&self, initial_url: &str, mut callback: F) -> EntraResult<u32>
    where
        T: DeserializeOwned,
        F: FnMut(Vec<T>) -> EntraResult<()>,
    {
        let mut url = initial_url.to_string();
        let mut pages = 0u32;

        loop {
            let response: ODataResponse<T> = self.get(&url).await?;
            pages += 1;
            debug!(page = pages, items = response.value.len(), "Fetched page");
            callback(response.value)?;

            match response.next_link {
                Some(next) => url = next,
                None => return Ok(pages),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odata_error_parsing() {
        let json = r#"{
            "error": {
                "code": "Authorization_RequestDenied",
                "message": "Insufficient privileges to complete the operation.",
                "innerError": {"date": "2024-01-15"}
            }
        }"#;

        let error: ODataError = serde_json::from_str(json).unwrap();
        assert_eq!(error.error.code, "Authorization_RequestDenied");
    }

    #[test]
    fn test_odata_response_parsing() {
        let json = r#"{
            "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#users",
            "value": [{"id": "1"}, {"id": "2"}],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/users?$skiptoken=xxx"
        }"#;

        let response: ODataResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert_eq!(response.value.len(), 2);
        assert!(response.next_link.is_some());
    }

    #[test]
    fn test_base_url_uses_override() {
        let config = EntraConfig::builder()
            .tenant_id("t")
            .base_url("http://localhost:1234")
            .build()
            .unwrap();
        let cache = Arc::new(TokenCache::new(
            crate::EntraCredentials::new("id", "secret"),
            &config,
        ));
        let client = GraphClient::new(cache, &config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:1234/v1.0");
    }
}
