//! Upstream Fetcher
//!
//! Generic JSON GET used as the producer for fetch-through requests. Maps
//! every kind of upstream failure to an [`UpstreamError`]; the cache itself
//! never looks at HTTP.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::UpstreamError;

const USER_AGENT: &str = concat!("pastpeek-cache/", env!("CARGO_PKG_VERSION"));

// == Http Fetcher ==
/// HTTP client restricted to an allow-list of upstream hosts.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    allowed_hosts: Arc<Vec<String>>,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration, allowed_hosts: Vec<String>) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            allowed_hosts: Arc::new(
                allowed_hosts
                    .into_iter()
                    .map(|h| h.to_ascii_lowercase())
                    .collect(),
            ),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        Self::new(config.upstream_timeout, config.allowed_hosts.clone())
    }

    // == Check Url ==
    /// Parses `url` and verifies it is http(s) on an allowed host.
    pub fn check_url(&self, url: &str) -> Result<Url, UpstreamError> {
        let parsed = Url::parse(url).map_err(|err| UpstreamError::InvalidUrl(err.to_string()))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(UpstreamError::InvalidUrl(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| UpstreamError::InvalidUrl("missing host".to_string()))?
            .to_ascii_lowercase();

        if !self.allowed_hosts.iter().any(|allowed| *allowed == host) {
            return Err(UpstreamError::HostNotAllowed(host));
        }

        Ok(parsed)
    }

    // == Fetch Json ==
    /// GETs `url` and returns its JSON body.
    ///
    /// Non-success status, a body that is not JSON, and an empty result
    /// (`null`, `[]`, `{}`) are all errors.
    pub async fn fetch_json(&self, url: &str) -> Result<Value, UpstreamError> {
        let url = self.check_url(url)?;
        debug!(%url, "fetching upstream");

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|_| UpstreamError::Malformed(url.to_string()))?;

        if is_empty_result(&value) {
            return Err(UpstreamError::Empty(url.to_string()));
        }
        Ok(value)
    }
}

fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}
