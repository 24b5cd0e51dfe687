//! HTTP client for fetching aircraft snapshots from the public ADS-B feed.

use crate::types::Snapshot;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL},
    Client, StatusCode,
};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_FEED_URL: &str = "https://opendata.adsb.fi";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Server returned error status: {status}")]
    ServerError { status: StatusCode },
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Circular area around a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchArea {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_nm: f64,
}

impl SearchArea {
    /// Circle of `radius_nm` nautical miles around a point.
    pub fn new(latitude: f64, longitude: f64, radius_nm: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius_nm,
        }
    }

    fn to_path(&self) -> String {
        format!(
            "/api/v2/lat/{}/lon/{}/dist/{}",
            self.latitude, self.longitude, self.radius_nm
        )
    }
}

/// Anything that can produce a snapshot of the aircraft inside an area.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, area: SearchArea) -> Result<Snapshot, ClientError>;
}

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FEED_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("flightclock/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the feed base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Client for the opendata ADS-B feed.
pub struct AdsbClient {
    client: Client,
    base_url: String,
}

impl AdsbClient {
    /// Create a new client with the given config.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, area: SearchArea) -> String {
        format!("{}{}", self.base_url, area.to_path())
    }
}

#[async_trait]
impl SnapshotSource for AdsbClient {
    async fn fetch(&self, area: SearchArea) -> Result<Snapshot, ClientError> {
        let url = self.url_for(area);
        tracing::debug!("Fetching: {}", url);

        let response = self.client.get(&url).send().await?;

        match response.status() {
            status if status.is_success() => {
                let body = response.bytes().await?;
                serde_json::from_slice(&body)
                    .map_err(|e| ClientError::InvalidResponse(e.to_string()))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(ClientError::RateLimited { retry_after })
            }
            status => Err(ClientError::ServerError { status }),
        }
    }
}
