//! Portal HTTP client.
//!
//! Provides async methods for fetching JSON, text and GraphQL results from a
//! portal. Handles user agent tagging, status classification and a short
//! in-place retry for transient failures.

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::error::ConnectionError;

/// User agent sent with every request unless overridden.
pub const DEFAULT_USER_AGENT: &str = concat!("onboard-poller/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of immediate retries after a transient failure.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Maximum number of body characters kept in error messages.
const BODY_EXCERPT_CHARS: usize = 500;

/// Configuration for a portal transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the portal
    pub base_url: String,
    /// User agent identifying this client
    pub user_agent: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Immediate retries after a transient failure
    pub max_retries: u32,
    /// Verify the portal's TLS certificate
    pub verify_tls: bool,
}

impl TransportConfig {
    /// Create a new config for the given portal base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            verify_tls: true,
        }
    }

    /// Set a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of immediate retries.
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Enable or disable TLS certificate verification.
    ///
    /// Some portals serve self-signed certificates.
    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }
}

/// HTTP client bound to one portal.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl Transport {
    /// Create a new transport with the given configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, ConnectionError> {
        let mut headers = HeaderMap::new();

        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|_| ConnectionError::Config("invalid user agent".to_string()))?;
        headers.insert(USER_AGENT, user_agent);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    /// The portal base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a path relative to the base URL.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// GET a path and parse the response as JSON.
    pub async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ConnectionError> {
        self.get_json_as(path, query).await
    }

    /// GET a path and deserialize the JSON response into `T`.
    pub async fn get_json_as<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ConnectionError> {
        let url = self.url(path);
        let body = self
            .execute(path, || self.http.get(&url).query(query))
            .await?;
        parse_json(&body)
    }

    /// GET a path and return the raw response body.
    pub async fn get_text(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<String, ConnectionError> {
        let url = self.url(path);
        self.execute(path, || self.http.get(&url).query(query))
            .await
    }

    /// POST a JSON body to a path and parse the JSON response.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ConnectionError> {
        let url = self.url(path);
        let response = self
            .execute(path, || self.http.post(&url).json(body))
            .await?;
        parse_json(&response)
    }

    /// Run a GraphQL query against the base URL and return its `data` member.
    ///
    /// A response carrying `errors`, or without `data`, is malformed.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value, ConnectionError> {
        let request = json!({ "query": query, "variables": variables });
        let mut response = self.post_json("", &request).await?;

        if let Some(errors) = response.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            let message = errors[0]
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown GraphQL error")
                .to_string();
            return Err(ConnectionError::malformed(message));
        }

        match response.get_mut("data").map(Value::take) {
            Some(data) if !data.is_null() => Ok(data),
            _ => Err(ConnectionError::malformed("GraphQL response has no data")),
        }
    }

    /// Send a request, retrying transient failures up to `max_retries` times.
    async fn execute(
        &self,
        path: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> Result<String, ConnectionError> {
        let mut attempt = 0;
        loop {
            match self.execute_once(path, build()).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(path, attempt, error = %e, "retrying request");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute_once(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<String, ConnectionError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectionError::Unauthorized);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ConnectionError::RateLimited);
        }

        if status == StatusCode::NOT_IMPLEMENTED {
            return Err(ConnectionError::FeatureMissing {
                path: path.to_string(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectionError::Api {
                status: status.as_u16(),
                message: excerpt(&body),
            });
        }

        Ok(response.text().await?)
    }
}

/// Parse a response body, rejecting empty bodies.
fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ConnectionError> {
    if body.trim().is_empty() {
        return Err(ConnectionError::malformed("empty response body"));
    }

    serde_json::from_str(body).map_err(|e| ConnectionError::Malformed {
        message: e.to_string(),
        body: Some(excerpt(body)),
    })
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
