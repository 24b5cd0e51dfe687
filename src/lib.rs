//! Overhead flight tracking for a fixed observer.
//!
//! This library provides functionality to:
//! - Poll a public ADS-B feed for aircraft around an observer
//! - Track which aircraft are in range and detect new arrivals
//! - Enrich arrivals with origin/destination routes (best effort)
//! - Place aircraft relative to the observer's facing direction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │   Client    │───▶│   Filter    │───▶│   Tracker   │───▶│ Enrichment  │
//! │   (feed)    │    │  (validity) │    │   (diff)    │    │  (lookups)  │
//! └─────────────┘    └─────────────┘    └─────────────┘    └─────────────┘
//!        ▲                                     │
//!        │              ┌─────────────┐        │
//!        └──────────────│   Poller    │◀───────┘
//!                       │   (timer)   │───▶ FlightView ───▶ display
//!                       └─────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use flightclock::{
//!     client::{AdsbClient, ClientConfig},
//!     enrichment::Enricher,
//!     lookup::LookupConfig,
//!     poller::{Poller, PollerConfig},
//!     tracker::FlightTracker,
//!     types::{Facing, Observer},
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let enricher = Enricher::from_config(&LookupConfig::default())?;
//!     let tracker = Arc::new(FlightTracker::new(enricher));
//!     let source = Arc::new(AdsbClient::new(ClientConfig::default())?);
//!
//!     let poller = Arc::new(Poller::new(
//!         tracker,
//!         source,
//!         Observer::new(55.978371, -3.59423, Facing::N),
//!         PollerConfig::default(),
//!     ));
//!
//!     let mut views = poller.subscribe();
//!     tokio::spawn(Arc::clone(&poller).run());
//!
//!     while views.changed().await.is_ok() {
//!         let view = views.borrow_and_update().clone();
//!         println!("{} aircraft, {} new", view.total, view.new_flights.len());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod enrichment;
pub mod filter;
pub mod geometry;
pub mod lookup;
pub mod poller;
pub mod tracker;
pub mod types;

pub use client::{AdsbClient, ClientConfig, SearchArea, SnapshotSource};
pub use enrichment::Enricher;
pub use geometry::{Placement, RelativeDirection};
pub use lookup::{HexDbClient, LookupConfig, RouteSetClient};
pub use poller::{DisplayMode, FlightView, Poller, PollerConfig, PollingPolicy};
pub use tracker::FlightTracker;
pub use types::{AircraftObservation, Airport, Facing, Observer, RouteInfo};
