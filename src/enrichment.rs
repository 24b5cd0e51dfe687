//! Best-effort route enrichment for newly arrived aircraft.
//!
//! Resolution order for a callsign:
//!
//! 1. primary route lookup, giving a raw `ORIGIN-DEST` string,
//! 2. both airport codes looked up concurrently,
//! 3. if the primary has no usable route, the fallback lookup, which returns
//!    a joined origin/destination pair directly.
//!
//! Every collaborator failure (transport error, bad status, malformed body,
//! timeout) is logged and treated as "this source had nothing". Resolution
//! itself never fails.

use crate::lookup::{
    AirportLookup, FallbackRouteLookup, HexDbClient, LookupConfig, LookupError, RouteLookup,
    RouteSetClient,
};
use crate::types::{Airport, RouteInfo};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single collaborator call, keeps the tracker's fan-in bounded.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Split a route string into its two codes. Exactly one `-` separator and two
/// non-empty codes are required.
pub fn parse_route(route: &str) -> Option<(&str, &str)> {
    let (origin, destination) = route.split_once('-')?;
    let (origin, destination) = (origin.trim(), destination.trim());
    if origin.is_empty() || destination.is_empty() || destination.contains('-') {
        return None;
    }
    Some((origin, destination))
}

pub struct Enricher {
    routes: Arc<dyn RouteLookup>,
    airports: Arc<dyn AirportLookup>,
    fallback: Arc<dyn FallbackRouteLookup>,
    timeout: Duration,
}

impl Enricher {
    /// Create an enricher from its three lookups.
    pub fn new(
        routes: Arc<dyn RouteLookup>,
        airports: Arc<dyn AirportLookup>,
        fallback: Arc<dyn FallbackRouteLookup>,
    ) -> Self {
        Self {
            routes,
            airports,
            fallback,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    /// hexdb.io as primary and airport source, adsb.lol routeset as fallback.
    pub fn from_config(config: &LookupConfig) -> Result<Self, LookupError> {
        let hexdb = Arc::new(HexDbClient::new(config)?);
        let routeset = Arc::new(RouteSetClient::new(config)?);
        Ok(Self::new(hexdb.clone(), hexdb, routeset).with_timeout(config.timeout))
    }

    /// Set the per-lookup timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the route for a callsign.
    ///
    /// Returns `None` only for a blank callsign, in which case no lookup is
    /// made. Otherwise a [`RouteInfo`] is always produced, possibly without
    /// origin, destination or route.
    pub async fn resolve(&self, callsign: &str, position: Option<(f64, f64)>) -> Option<RouteInfo> {
        let flight = callsign.trim();
        if flight.is_empty() {
            return None;
        }

        let primary = self.attempt("route", flight, self.routes.route(flight)).await;

        if let Some(route) = primary.as_deref() {
            if let Some((origin, destination)) = parse_route(route) {
                let (origin, destination) =
                    tokio::join!(self.airport(origin), self.airport(destination));

                tracing::info!("Resolved {} via primary lookup: {}", flight, route);
                return Some(RouteInfo {
                    flight: flight.to_string(),
                    origin,
                    destination,
                    route: Some(route.to_string()),
                });
            }
            tracing::warn!("Invalid route format for {}: {:?}", flight, route);
        } else {
            tracing::debug!("No primary route for {}, trying fallback", flight);
        }

        if let Some(pair) = self
            .attempt("fallback route", flight, self.fallback.route_pair(flight, position))
            .await
        {
            tracing::info!("Resolved {} via fallback lookup", flight);
            return Some(RouteInfo {
                flight: flight.to_string(),
                origin: Some(pair.origin),
                destination: Some(pair.destination),
                route: pair.route.or(primary),
            });
        }

        tracing::info!("No route found for {}", flight);
        Some(RouteInfo {
            route: primary,
            ..RouteInfo::unresolved(flight)
        })
    }

    async fn airport(&self, code: &str) -> Option<Airport> {
        self.attempt("airport", code, self.airports.airport(code)).await
    }

    /// Run one collaborator call under the timeout, folding every failure into `None`.
    async fn attempt<T, F>(&self, what: &str, key: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<Option<T>, LookupError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                tracing::warn!("{} lookup for {} failed: {}", what, key, e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    "{} lookup for {} failed: {}",
                    what,
                    key,
                    LookupError::Timeout(self.timeout)
                );
                None
            }
        }
    }
}
