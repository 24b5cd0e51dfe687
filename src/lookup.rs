//! Route and airport lookup services.
//!
//! Three collaborator roles feed the enrichment pipeline:
//!
//! - [`RouteLookup`]: callsign to a raw `ORIGIN-DEST` route string,
//! - [`AirportLookup`]: ICAO/IATA code to an [`Airport`],
//! - [`FallbackRouteLookup`]: callsign (and position) to an already joined
//!   origin/destination pair.
//!
//! [`HexDbClient`] serves the first two from hexdb.io, [`RouteSetClient`] the
//! third from the adsb.lol routeset API.

use crate::types::Airport;
use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const HEXDB_URL: &str = "https://hexdb.io/api/v1";
pub const ROUTESET_URL: &str = "https://api.adsb.lol";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Server returned error status: {status}")]
    Status { status: StatusCode },
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Lookup timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait RouteLookup: Send + Sync {
    /// Raw route string for a callsign, `None` if the service does not know it.
    async fn route(&self, callsign: &str) -> Result<Option<String>, LookupError>;
}

#[async_trait]
pub trait AirportLookup: Send + Sync {
    async fn airport(&self, code: &str) -> Result<Option<Airport>, LookupError>;
}

/// Origin and destination resolved in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePair {
    pub origin: Airport,
    pub destination: Airport,
    pub route: Option<String>,
}

#[async_trait]
pub trait FallbackRouteLookup: Send + Sync {
    async fn route_pair(
        &self,
        callsign: &str,
        position: Option<(f64, f64)>,
    ) -> Result<Option<RoutePair>, LookupError>;
}

/// Configuration shared by the lookup clients.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub hexdb_url: String,
    pub routeset_url: String,
    /// Transport-level timeout per request.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            hexdb_url: HEXDB_URL.to_string(),
            routeset_url: ROUTESET_URL.to_string(),
            timeout: Duration::from_secs(10),
            user_agent: concat!("flightclock/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl LookupConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hexdb base URL.
    pub fn with_hexdb_url(mut self, url: impl Into<String>) -> Self {
        self.hexdb_url = url.into();
        self
    }

    /// Set the routeset base URL.
    pub fn with_routeset_url(mut self, url: impl Into<String>) -> Self {
        self.routeset_url = url.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_client(&self) -> Result<Client, LookupError> {
        Ok(Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.timeout)
            .gzip(true)
            .build()?)
    }
}

/// Send a request and decode a JSON body. 404 means "not found", not an error.
async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<Option<T>, LookupError> {
    let response = request.header(ACCEPT, "application/json").send().await?;

    match response.status() {
        status if status.is_success() => {
            let body = response.bytes().await?;
            Ok(Some(serde_json::from_slice(&body)?))
        }
        StatusCode::NOT_FOUND => Ok(None),
        status => Err(LookupError::Status { status }),
    }
}

#[derive(Debug, Deserialize)]
struct HexDbRoute {
    #[serde(default)]
    route: Option<String>,
}

/// hexdb.io route and airport lookups.
pub struct HexDbClient {
    client: Client,
    base_url: String,
}

impl HexDbClient {
    /// Create a hexdb client against `config.hexdb_url`.
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        Ok(Self {
            client: config.build_client()?,
            base_url: config.hexdb_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RouteLookup for HexDbClient {
    async fn route(&self, callsign: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/route/icao/{}", self.base_url, callsign.trim());
        tracing::debug!("Fetching route: {}", url);

        let found: Option<HexDbRoute> = send_json(self.client.get(&url)).await?;
        Ok(found
            .and_then(|r| r.route)
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()))
    }
}

#[async_trait]
impl AirportLookup for HexDbClient {
    async fn airport(&self, code: &str) -> Result<Option<Airport>, LookupError> {
        let url = format!("{}/airport/icao/{}", self.base_url, code.trim());
        tracing::debug!("Fetching airport: {}", url);

        // hexdb answers unknown codes with a 200 and an error object, which
        // decodes to an airport without any codes.
        let found: Option<Airport> = send_json(self.client.get(&url)).await?;
        Ok(found.filter(|a| !a.icao.is_empty() || !a.iata.is_empty()))
    }
}

#[derive(Debug, Serialize)]
struct RouteSetRequest<'a> {
    planes: [RouteSetPlane<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RouteSetPlane<'a> {
    callsign: &'a str,
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct RouteSetEntry {
    #[serde(default)]
    airport_codes: Option<String>,
    #[serde(rename = "_airports", default)]
    airports: Vec<RouteSetAirport>,
}

#[derive(Debug, Deserialize)]
struct RouteSetAirport {
    #[serde(default)]
    countryiso2: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    iata: String,
    #[serde(default)]
    icao: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
}

impl From<RouteSetAirport> for Airport {
    fn from(a: RouteSetAirport) -> Self {
        Airport {
            country_code: a.countryiso2,
            region_name: a.location,
            iata: a.iata,
            icao: a.icao,
            name: a.name,
            latitude: a.lat,
            longitude: a.lon,
        }
    }
}

impl RouteSetEntry {
    /// Origin is the first airport and destination the last one, so a
    /// multi-leg route reports where the flight finally lands rather than its
    /// first stop.
    fn into_pair(self) -> Option<RoutePair> {
        if self.airports.len() < 2 {
            return None;
        }
        let mut airports = self.airports.into_iter();
        let origin = airports.next()?;
        let destination = airports.last()?;

        Some(RoutePair {
            origin: origin.into(),
            destination: destination.into(),
            route: self.airport_codes.filter(|c| !c.is_empty() && c != "unknown"),
        })
    }
}

/// adsb.lol routeset lookup.
pub struct RouteSetClient {
    client: Client,
    base_url: String,
}

impl RouteSetClient {
    /// Create a routeset client against `config.routeset_url`.
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        Ok(Self {
            client: config.build_client()?,
            base_url: config.routeset_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FallbackRouteLookup for RouteSetClient {
    async fn route_pair(
        &self,
        callsign: &str,
        position: Option<(f64, f64)>,
    ) -> Result<Option<RoutePair>, LookupError> {
        let url = format!("{}/api/0/routeset", self.base_url);
        let (lat, lng) = position.unwrap_or((0.0, 0.0));
        let body = RouteSetRequest {
            planes: [RouteSetPlane {
                callsign: callsign.trim(),
                lat,
                lng,
            }],
        };
        tracing::debug!("Fetching routeset for {}: {}", callsign.trim(), url);

        let found: Option<Vec<RouteSetEntry>> =
            send_json(self.client.post(&url).json(&body)).await?;

        Ok(found
            .and_then(|entries| entries.into_iter().next())
            .and_then(RouteSetEntry::into_pair))
    }
}
