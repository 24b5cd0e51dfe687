//! Flight state tracker.
//!
//! Holds the set of aircraft currently in range, works out which of them
//! arrived since the previous snapshot and enriches those arrivals with route
//! information.
//!
//! # Cycle
//!
//! ```text
//! snapshot ──▶ filter ──▶ diff against previous ids ──▶ arrivals
//!                                                         │
//!                              ┌───────────┬──────────────┤ fan-out
//!                              ▼           ▼              ▼
//!                           resolve     resolve   ...  resolve
//!                              └───────────┴──────────────┤ fan-in
//!                                                         ▼
//!                                       publish current + arrivals + routes
//! ```
//!
//! The new state is published in one write once every lookup has settled, so
//! readers always see `current`, `arrivals` and the route cache from the same
//! completed cycle. The tracker does not guard against overlapping
//! [`FlightTracker::update`] calls; the poller runs at most one at a time.

use crate::enrichment::Enricher;
use crate::filter;
use crate::types::{AircraftObservation, ArrivalView, RouteInfo};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct TrackerState {
    current: HashMap<String, AircraftObservation>,
    /// Identifiers of `current` in snapshot order.
    order: Vec<String>,
    arrivals: Vec<String>,
    /// Never evicted.
    routes: HashMap<String, RouteInfo>,
    last_update: Option<DateTime<Utc>>,
}

pub struct FlightTracker {
    enricher: Enricher,
    state: RwLock<TrackerState>,
}

impl FlightTracker {
    /// Create an empty tracker that resolves routes through `enricher`.
    pub fn new(enricher: Enricher) -> Self {
        Self {
            enricher,
            state: RwLock::new(TrackerState::default()),
        }
    }

    /// Apply a snapshot and return the identifiers that arrived with it, in
    /// snapshot order.
    ///
    /// Returns once the route lookups for every arrival have settled.
    pub async fn update(&self, snapshot: Vec<AircraftObservation>) -> Vec<String> {
        let received = snapshot.len();
        let valid = filter::filter_valid(snapshot);
        if valid.len() < received {
            tracing::debug!("Dropped {} invalid records", received - valid.len());
        }

        let previous: HashSet<String> = self.state.read().current.keys().cloned().collect();

        let mut current = HashMap::with_capacity(valid.len());
        let mut order = Vec::with_capacity(valid.len());
        for aircraft in valid {
            if !current.contains_key(&aircraft.hex) {
                order.push(aircraft.hex.clone());
            }
            current.insert(aircraft.hex.clone(), aircraft);
        }

        let arrivals: Vec<String> = order
            .iter()
            .filter(|id| !previous.contains(*id))
            .cloned()
            .collect();

        let routes = self.enrich(&arrivals, &current).await;
        let now = Utc::now();

        let mut state = self.state.write();
        state.current = current;
        state.order = order;
        state.routes.extend(routes);
        state.arrivals = arrivals.clone();
        state.last_update = Some(now);

        arrivals
    }

    async fn enrich(
        &self,
        arrivals: &[String],
        current: &HashMap<String, AircraftObservation>,
    ) -> Vec<(String, RouteInfo)> {
        let pending: Vec<(String, String, Option<(f64, f64)>)> = arrivals
            .iter()
            .filter_map(|id| {
                let aircraft = current.get(id)?;
                let callsign = aircraft.callsign()?;
                Some((id.clone(), callsign.to_string(), aircraft.position()))
            })
            .collect();

        if pending.is_empty() {
            return Vec::new();
        }

        tracing::info!(
            "Fetching route info for {} new flights: {:?}",
            pending.len(),
            pending.iter().map(|(id, _, _)| id.as_str()).collect::<Vec<_>>()
        );

        let enricher = &self.enricher;
        let lookups = pending.into_iter().map(|(id, callsign, position)| async move {
            let info = enricher.resolve(&callsign, position).await;
            (id, info)
        });

        join_all(lookups)
            .await
            .into_iter()
            .filter_map(|(id, info)| info.map(|info| (id, info)))
            .collect()
    }

    /// Currently tracked aircraft in snapshot order.
    pub fn aircraft(&self) -> Vec<AircraftObservation> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.current.get(id).cloned())
            .collect()
    }

    /// Get a tracked aircraft by hex identifier.
    pub fn get(&self, id: &str) -> Option<AircraftObservation> {
        self.state.read().current.get(id).cloned()
    }

    /// Identifiers that arrived with the last completed cycle.
    pub fn arrivals(&self) -> Vec<String> {
        self.state.read().arrivals.clone()
    }

    /// Arrivals merged with their route, where one was resolved.
    pub fn arrivals_with_routes(&self) -> Vec<ArrivalView> {
        let state = self.state.read();
        state
            .arrivals
            .iter()
            .filter_map(|id| {
                let flight = state.current.get(id)?.clone();
                Some(ArrivalView {
                    hex_code: id.clone(),
                    flight,
                    info: state.routes.get(id).cloned(),
                })
            })
            .collect()
    }

    /// Number of aircraft currently tracked.
    pub fn count(&self) -> usize {
        self.state.read().current.len()
    }

    /// When the last cycle completed, if any has.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_update
    }

    /// Cached route for an aircraft, if one was resolved.
    pub fn route_for(&self, id: &str) -> Option<RouteInfo> {
        self.state.read().routes.get(id).cloned()
    }

    /// Copy of the whole route cache.
    pub fn routes(&self) -> HashMap<String, RouteInfo> {
        self.state.read().routes.clone()
    }

    /// Forget this cycle's arrivals without touching the tracked set.
    pub fn clear_arrivals(&self) {
        self.state.write().arrivals.clear();
    }

    /// Back to the freshly constructed state, route cache included.
    pub fn reset(&self) {
        *self.state.write() = TrackerState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::tests::FakeLookups;
    use std::sync::atomic::Ordering;

    fn obs(id: &str, lat: f64, lon: f64) -> AircraftObservation {
        AircraftObservation::new(id, lat, lon)
    }

    fn tracker() -> FlightTracker {
        let (_, enricher) = FakeLookups::default()
            .with_route("EZY18KL", "EGPH-LFPG")
            .with_airport("EGPH")
            .with_airport("LFPG")
            .into_enricher();
        FlightTracker::new(enricher)
    }

    #[tokio::test]
    async fn test_scenarios() {
        let tracker = tracker();

        // A: first sighting
        let s1 = vec![obs("A1", 56.0, -3.5).with_flight("EZY18KL ")];
        assert_eq!(tracker.update(s1.clone()).await, vec!["A1"]);
        assert_eq!(tracker.count(), 1);
        assert!(tracker.route_for("A1").unwrap().is_resolved());

        // B: one more aircraft joins
        let mut s2 = s1.clone();
        s2.push(obs("B2", 55.9, -3.6));
        assert_eq!(tracker.update(s2).await, vec!["B2"]);
        assert_eq!(tracker.count(), 2);
        assert!(tracker.route_for("A1").is_some());

        // C: A1 leaves, its route stays cached
        let s3 = vec![obs("B2", 55.9, -3.6)];
        assert!(tracker.update(s3).await.is_empty());
        assert_eq!(tracker.count(), 1);
        assert!(tracker.get("A1").is_none());
        assert!(tracker.route_for("A1").is_some());
    }

    #[tokio::test]
    async fn test_same_snapshot_twice() {
        let tracker = tracker();
        let snap = vec![obs("A1", 56.0, -3.5), obs("B2", 55.9, -3.6)];

        assert_eq!(tracker.update(snap.clone()).await.len(), 2);
        assert!(tracker.update(snap).await.is_empty());
        assert!(tracker.arrivals().is_empty());
        assert_eq!(tracker.count(), 2);
    }

    #[tokio::test]
    async fn test_arrivals_are_set_difference() {
        let tracker = tracker();
        let snapshots = vec![
            vec![obs("a", 1.0, 1.0), obs("b", 1.0, 1.0)],
            vec![obs("b", 1.0, 1.0), obs("c", 1.0, 1.0), obs("x", 99.0, 1.0)],
            vec![],
            vec![obs("d", 1.0, 1.0), obs("a", 1.0, 1.0), obs("", 1.0, 1.0)],
            vec![obs("a", 1.0, 1.0), obs("e", 1.0, 1.0), obs("d", 1.0, 1.0)],
        ];

        let mut previous: HashSet<String> = HashSet::new();
        for snap in snapshots {
            let valid: Vec<String> = filter::filter_valid(snap.clone())
                .into_iter()
                .map(|a| a.hex)
                .collect();
            let expected: Vec<String> = valid
                .iter()
                .filter(|id| !previous.contains(*id))
                .cloned()
                .collect();

            assert_eq!(tracker.update(snap).await, expected);
            previous = valid.into_iter().collect();
            assert_eq!(tracker.count(), previous.len());
        }
    }

    #[tokio::test]
    async fn test_arrivals_keep_snapshot_order() {
        let tracker = tracker();
        let snap = vec![obs("z", 1.0, 1.0), obs("m", 1.0, 1.0), obs("a", 1.0, 1.0)];
        assert_eq!(tracker.update(snap).await, vec!["z", "m", "a"]);

        let ids: Vec<String> = tracker.aircraft().into_iter().map(|a| a.hex).collect();
        assert_eq!(ids, vec!["z", "m", "a"]);
    }

    #[tokio::test]
    async fn test_invalid_records_dropped() {
        let tracker = tracker();
        let snap = vec![
            obs("", 56.0, -3.5),
            obs("bad", 123.0, -3.5),
            obs("ok", 56.0, -3.5),
        ];
        assert_eq!(tracker.update(snap).await, vec!["ok"]);
        assert_eq!(tracker.count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_last_write_wins() {
        let tracker = tracker();
        let snap = vec![obs("A1", 50.0, 1.0), obs("A1", 51.0, 2.0)];
        assert_eq!(tracker.update(snap).await, vec!["A1"]);
        assert_eq!(tracker.count(), 1);
        assert_eq!(tracker.get("A1").unwrap().lat, Some(51.0));
    }

    #[tokio::test]
    async fn test_enrichment_only_for_arrivals_with_callsign() {
        let (fake, enricher) = FakeLookups::default().into_enricher();
        let tracker = FlightTracker::new(enricher);

        let snap = vec![
            obs("A1", 56.0, -3.5).with_flight("BAW1"),
            obs("B2", 56.0, -3.5),
            obs("C3", 56.0, -3.5).with_flight("  "),
        ];
        tracker.update(snap.clone()).await;
        assert_eq!(fake.route_calls.load(Ordering::SeqCst), 1);

        // Unresolved lookups are still cached as "looked up, nothing found".
        assert_eq!(tracker.route_for("A1"), Some(RouteInfo::unresolved("BAW1")));
        assert!(tracker.route_for("B2").is_none());

        tracker.update(snap).await;
        assert_eq!(fake.route_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_does_not_fail_cycle() {
        let mut fake = FakeLookups::default().with_pair("GOOD1", "EGPH", "LEMG");
        fake.fail_routes = true;
        let (_, enricher) = fake.into_enricher();
        let tracker = FlightTracker::new(enricher);

        let snap = vec![
            obs("A1", 56.0, -3.5).with_flight("BAD1"),
            obs("B2", 56.0, -3.5).with_flight("GOOD1"),
        ];
        assert_eq!(tracker.update(snap).await, vec!["A1", "B2"]);
        assert!(!tracker.route_for("A1").unwrap().is_resolved());
        assert!(tracker.route_for("B2").unwrap().is_resolved());
    }

    #[tokio::test]
    async fn test_arrivals_with_routes() {
        let tracker = tracker();
        tracker.update(vec![obs("A1", 56.0, -3.5)]).await;

        let snap = vec![
            obs("A1", 56.0, -3.5),
            obs("B2", 55.9, -3.6).with_flight("EZY18KL"),
            obs("C3", 55.8, -3.7),
        ];
        tracker.update(snap).await;

        let merged = tracker.arrivals_with_routes();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].hex_code, "B2");
        assert_eq!(merged[0].info.as_ref().unwrap().route.as_deref(), Some("EGPH-LFPG"));
        assert_eq!(merged[1].hex_code, "C3");
        assert!(merged[1].info.is_none());
    }

    #[tokio::test]
    async fn test_last_update_advances() {
        let tracker = tracker();
        assert!(tracker.last_update().is_none());

        tracker.update(vec![obs("A1", 56.0, -3.5)]).await;
        let first = tracker.last_update().unwrap();
        tracker.update(vec![]).await;
        let second = tracker.last_update().unwrap();
        assert!(second >= first);
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_clear_and_reset() {
        let tracker = tracker();
        tracker
            .update(vec![obs("A1", 56.0, -3.5).with_flight("EZY18KL")])
            .await;

        tracker.clear_arrivals();
        assert!(tracker.arrivals().is_empty());
        assert_eq!(tracker.count(), 1);

        tracker.reset();
        assert_eq!(tracker.count(), 0);
        assert!(tracker.routes().is_empty());
        assert!(tracker.last_update().is_none());

        // After a reset everything counts as new again.
        assert_eq!(tracker.update(vec![obs("A1", 56.0, -3.5)]).await, vec!["A1"]);
    }
}
