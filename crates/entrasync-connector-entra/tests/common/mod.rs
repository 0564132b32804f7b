//! Common test utilities for entrasync-connector-entra integration tests.

#![cfg(feature = "integration")]
#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use entrasync_connector_entra::{EntraConfig, EntraCredentials, EntraDirectory, RateLimitConfig};

pub const TENANT_ID: &str = "test-tenant";

/// Test data factory for creating Entra users.
pub fn create_test_user(id: &str, prefix: &str) -> Value {
    json!({
        "id": id,
        "userPrincipalName": format!("{prefix}@test.onmicrosoft.com"),
        "displayName": format!("Test User {prefix}"),
        "givenName": "Test",
        "surname": "User",
        "mail": format!("{prefix}@example.com"),
        "businessPhones": ["+47 111 11 111", "+47 222 22 222"],
        "mobilePhone": null,
        "department": "Testing",
        "jobTitle": "Test Engineer",
        "officeLocation": "Oslo",
        "accountEnabled": true
    })
}

/// Generate a sequence of test users.
pub fn generate_test_users(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| create_test_user(&format!("user-{i}"), &format!("user{i}")))
        .collect()
}

/// Wraps items in an OData collection response.
pub fn create_odata_response(items: Vec<Value>, next_link: Option<&str>) -> Value {
    let mut response = json!({
        "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#users",
        "value": items
    });
    if let Some(link) = next_link {
        response["@odata.nextLink"] = json!(link);
    }
    response
}

/// Creates an OData error response.
pub fn create_odata_error(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Creates a mock OAuth token response.
pub fn create_token_response(access_token: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in
    })
}

/// Replies with each template in turn, repeating the last one.
pub struct SequenceResponder {
    responses: Vec<ResponseTemplate>,
    calls: AtomicUsize,
}

impl SequenceResponder {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        Self {
            responses,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = call.min(self.responses.len() - 1);
        self.responses[idx].clone()
    }
}

/// Mock server wrapper with common setup helpers.
pub struct MockGraphServer {
    pub server: MockServer,
}

impl MockGraphServer {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Token endpoint that must be hit exactly `times` times.
    pub async fn mock_token_endpoint(&self, times: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/{TENANT_ID}/oauth2/v2.0/token")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(create_token_response("mock-access-token", 3600)),
            )
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Token endpoint rejecting the client secret.
    pub async fn mock_token_rejected(&self) {
        Mock::given(method("POST"))
            .and(path(format!("/{TENANT_ID}/oauth2/v2.0/token")))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&self.server)
            .await;
    }

    /// Token endpoint answering every request with `status`.
    pub async fn mock_token_failure(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(format!("/{TENANT_ID}/oauth2/v2.0/token")))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": "temporarily_unavailable",
                "error_description": "AADSTS50196: The server terminated an operation."
            })))
            .mount(&self.server)
            .await;
    }

    /// Next link for page `index` (1-based continuation pages).
    pub fn page_link(&self, index: usize) -> String {
        format!("{}/v1.0/users?$skiptoken=page{index}", self.url())
    }

    /// Serve `users` across pages of `page_size`.
    pub async fn mock_users_pages(&self, users: Vec<Value>, page_size: usize) {
        let pages: Vec<Vec<Value>> = if users.is_empty() {
            vec![Vec::new()]
        } else {
            users.chunks(page_size).map(<[Value]>::to_vec).collect()
        };
        let total = pages.len();

        for (i, page) in pages.into_iter().enumerate() {
            let next = (i + 1 < total).then(|| self.page_link(i + 1));
            let body = create_odata_response(page, next.as_deref());
            self.mock_users_page(i, ResponseTemplate::new(200).set_body_json(body))
                .await;
        }
    }

    /// Serve a single page (0 is the initial query) with `response`.
    pub async fn mock_users_page(&self, index: usize, response: impl Respond + 'static) {
        let mock = Mock::given(method("GET")).and(path("/v1.0/users"));
        let mock = if index == 0 {
            mock.and(query_param_is_missing("$skiptoken"))
        } else {
            mock.and(query_param("$skiptoken", format!("page{index}")))
        };
        mock.respond_with(response).mount(&self.server).await;
    }

    /// Directory pointed at this server with short backoff delays.
    pub fn directory(&self, page_size: u32, timeout_secs: u64) -> EntraDirectory {
        let config = EntraConfig::builder()
            .tenant_id(TENANT_ID)
            .base_url(self.url())
            .page_size(page_size)
            .fetch_timeout_secs(timeout_secs)
            .build()
            .unwrap();
        EntraDirectory::with_rate_limit_config(
            config,
            EntraCredentials::new("client-id", "client-secret"),
            RateLimitConfig {
                jitter_factor: 0.0,
                ..RateLimitConfig::for_testing()
            },
        )
        .unwrap()
    }
}
