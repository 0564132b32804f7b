//! Microsoft Entra ID directory adapter for entrasync
//!
//! Reads every user of an Entra ID tenant through Microsoft Graph and
//! yields them as [`entrasync_connector::directory::DirectoryUser`] records
//! keyed on the user principal name.
//!
//! # Features
//!
//! - `OAuth2` client credentials authentication with token caching
//! - Transparent `@odata.nextLink` pagination; any failing page fails the fetch
//! - Multi-valued properties (`businessPhones`) kept as ordered lists
//! - Exponential backoff with jitter on 429 and 502/503/504, honouring `Retry-After`
//! - Circuit breaker and request metrics
//! - Whole-fetch timeout
//! - Multi-cloud support (Commercial, US Government, China)
//!
//! # Example
//!
//! ```no_run
//! use entrasync_connector::traits::DirectorySource;
//! use entrasync_connector_entra::{EntraConfig, EntraCredentials, EntraDirectory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EntraConfig::builder()
//!     .tenant_id("your-tenant-id")
//!     .build()?;
//! let credentials = EntraCredentials::new("your-client-id", "your-client-secret");
//!
//! let directory = EntraDirectory::new(config, credentials)?;
//! let users = directory.fetch_all().await?;
//! println!("{} users", users.len());
//! # Ok(())
//! # }
//! ```

mod auth;
mod circuit_breaker;
mod config;
mod directory;
mod error;
mod graph_client;
mod metrics;
mod rate_limit;

pub use auth::TokenCache;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState};
pub use config::{EntraCloudEnvironment, EntraConfig, EntraConfigBuilder, EntraCredentials};
pub use directory::{user_from_graph, EntraDirectory, IDENTITY_PROPERTY, USER_SELECT_FIELDS};
pub use error::{EntraError, EntraResult};
pub use graph_client::{GraphClient, ODataError, ODataResponse};
pub use metrics::RateLimitMetrics;
pub use rate_limit::{RateLimitConfig, RateLimiter};
