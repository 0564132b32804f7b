//! Reading every Entra ID user as a [`DirectoryUser`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use entrasync_connector::directory::{AttributeValue, DirectoryUser};
use entrasync_connector::error::{FetchError, FetchResult};
use entrasync_connector::traits::DirectorySource;

use crate::metrics::RateLimitMetrics;
use crate::rate_limit::RateLimitConfig;
use crate::{EntraConfig, EntraCredentials, EntraError, EntraResult, GraphClient, TokenCache};

/// User properties requested from Graph.
pub const USER_SELECT_FIELDS: &str = "id,userPrincipalName,mail,displayName,givenName,surname,\
    businessPhones,mobilePhone,department,jobTitle,officeLocation,accountEnabled";

/// Property used as the identity key.
pub const IDENTITY_PROPERTY: &str = "userPrincipalName";

/// Converts one Graph user object.
///
/// Strings become single values, string arrays become ordered multi values
/// and booleans become `"true"`/`"false"`. Nulls and `@odata.*` annotations
/// are dropped.
pub fn user_from_graph(value: &Value) -> EntraResult<DirectoryUser> {
    let object = value
        .as_object()
        .ok_or_else(|| EntraError::MalformedUser("user is not a JSON object".to_string()))?;

    let upn = object
        .get(IDENTITY_PROPERTY)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            let id = object.get("id").and_then(Value::as_str).unwrap_or("<unknown>");
            EntraError::MalformedUser(format!("user {id} has no {IDENTITY_PROPERTY}"))
        })?;

    let mut attributes = BTreeMap::new();
    for (name, raw) in object {
        if name.starts_with('@') {
            continue;
        }
        let value = match raw {
            Value::String(s) => AttributeValue::Single(s.clone()),
            Value::Bool(b) => AttributeValue::Single(b.to_string()),
            Value::Number(n) => AttributeValue::Single(n.to_string()),
            Value::Array(items) => AttributeValue::Multi(
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
            ),
            Value::Null | Value::Object(_) => continue,
        };
        attributes.insert(name.clone(), value);
    }

    Ok(DirectoryUser::with_attributes(upn, attributes))
}

/// Entra ID tenant exposed as a directory source.
#[derive(Debug)]
pub struct EntraDirectory {
    config: EntraConfig,
    client: GraphClient,
    extra_select: Vec<String>,
}

impl EntraDirectory {
    pub fn new(config: EntraConfig, credentials: EntraCredentials) -> EntraResult<Self> {
        Self::with_rate_limit_config(config, credentials, RateLimitConfig::default())
    }

    pub fn with_rate_limit_config(
        config: EntraConfig,
        credentials: EntraCredentials,
        rate_limit_config: RateLimitConfig,
    ) -> EntraResult<Self> {
        config.validate()?;
        let token_cache = Arc::new(TokenCache::new(credentials, &config));
        let client = GraphClient::with_rate_limit_config(token_cache, &config, rate_limit_config)?;
        Ok(Self {
            config,
            client,
            extra_select: Vec::new(),
        })
    }

    /// Also request these properties, e.g. the sources of the field mapping.
    #[must_use]
    pub fn with_select_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            let known = USER_SELECT_FIELDS.split(',').any(|f| f == field)
                || self.extra_select.contains(&field);
            if !known && !field.trim().is_empty() {
                self.extra_select.push(field);
            }
        }
        self
    }

    #[must_use]
    pub fn config(&self) -> &EntraConfig {
        &self.config
    }

    pub async fn rate_limit_metrics(&self) -> RateLimitMetrics {
        self.client.rate_limit_metrics().await
    }

    /// First page URL of the users query.
    #[must_use]
    pub fn users_url(&self) -> String {
        let mut select = USER_SELECT_FIELDS.to_string();
        for field in &self.extra_select {
            select.push(',');
            select.push_str(field);
        }
        let mut url = format!(
            "{}/users?$select={}&$top={}",
            self.client.base_url(),
            select,
            self.config.page_size
        );
        if let Some(filter) = &self.config.user_filter {
            url.push_str("&$filter=");
            url.push_str(&urlencoding::encode(filter));
        }
        url
    }

    async fn fetch_pages(&self) -> EntraResult<(Vec<DirectoryUser>, u32)> {
        let mut users = Vec::new();
        let pages = self
            .client
            .get_paginated(&self.users_url(), |page: Vec<Value>| {
                for value in &page {
                    users.push(user_from_graph(value)?);
                }
                Ok(())
            })
            .await?;
        Ok((users, pages))
    }
}

#[async_trait]
impl DirectorySource for EntraDirectory {
    fn name(&self) -> &str {
        "entra"
    }

    #[instrument(skip(self), fields(tenant_id = %self.config.tenant_id))]
    async fn fetch_all(&self) -> FetchResult<Vec<DirectoryUser>> {
        let timeout_secs = self.config.fetch_timeout_secs;
        let (users, pages) =
            tokio::time::timeout(Duration::from_secs(timeout_secs), self.fetch_pages())
                .await
                .map_err(|_| FetchError::Timeout { timeout_secs })??;

        info!(users = users.len(), pages, "Fetched Entra users");
        Ok(users)
    }
}
