//! Flight clock CLI
//!
//! Watches the sky around a fixed observer and reports aircraft as they arrive.

use clap::{Parser, Subcommand};
use flightclock::{
    client::{AdsbClient, ClientConfig},
    enrichment::Enricher,
    geometry::Placement,
    lookup::LookupConfig,
    poller::{CycleOutcome, DisplayMode, FlightView, Poller, PollerConfig},
    tracker::FlightTracker,
    types::{AircraftObservation, Facing, Observer, RouteInfo},
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "flightclock")]
#[command(about = "Tracks aircraft overhead and announces new arrivals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Observer latitude
    #[arg(long, env = "FLIGHTCLOCK_LATITUDE", default_value = "55.978371", allow_negative_numbers = true)]
    latitude: f64,

    /// Observer longitude
    #[arg(long, env = "FLIGHTCLOCK_LONGITUDE", default_value = "-3.59423", allow_negative_numbers = true)]
    longitude: f64,

    /// Search radius in nautical miles
    #[arg(long, env = "FLIGHTCLOCK_RADIUS_NM", default_value = "10")]
    radius: f64,

    /// Direction the display faces (N, NE, E, SE, S, SW, W, NW or degrees)
    #[arg(long, env = "FLIGHTCLOCK_FACING", default_value = "N")]
    facing: String,

    /// Per-request timeout for route and airport lookups, in seconds
    #[arg(long, default_value = "10")]
    lookup_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll continuously and report new arrivals
    Watch {
        /// Print every view as one JSON line
        #[arg(long)]
        json: bool,

        /// Poll at a fixed interval (seconds) instead of the adaptive cadence
        #[arg(short, long)]
        interval: Option<u64>,

        /// Use the radar display cadence (always fast)
        #[arg(long)]
        radar: bool,
    },

    /// Run a single cycle and list the aircraft in range
    Once,

    /// Look up the route for a callsign
    Route {
        callsign: String,
    },

    /// Show where a position lies relative to the observer
    Locate {
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let facing = cli.facing.parse().unwrap_or_else(|e| {
        tracing::warn!("{}, facing north", e);
        Facing::N
    });
    let observer = Observer::new(cli.latitude, cli.longitude, facing);
    let lookup_config =
        LookupConfig::default().with_timeout(Duration::from_secs(cli.lookup_timeout));

    match cli.command {
        Commands::Watch {
            json,
            interval,
            radar,
        } => {
            let poller = build_poller(observer, cli.radius, &lookup_config)?;
            if let Some(secs) = interval {
                poller.set_interval(Duration::from_secs(secs));
            } else if radar {
                poller.set_display_mode(DisplayMode::Radar);
            }
            watch(poller, cli.radius, json).await;
        }

        Commands::Once => {
            let poller = build_poller(observer, cli.radius, &lookup_config)?;
            match poller.refresh().await? {
                CycleOutcome::Completed { .. } => print_table(&poller.latest(), cli.radius),
                CycleOutcome::Skipped => eprintln!("Another cycle is already running"),
            }
        }

        Commands::Route { callsign } => {
            let enricher = Enricher::from_config(&lookup_config)?;
            match enricher.resolve(&callsign, None).await {
                Some(info) => println!("{}", serde_json::to_string_pretty(&info)?),
                None => eprintln!("Empty callsign"),
            }
        }

        Commands::Locate { lat, lon } => match Placement::compute(&observer, lat, lon, cli.radius) {
            Some(p) => {
                println!("Bearing:   {:.1}°", p.bearing);
                println!("Distance:  {:.2} NM", p.distance_nm);
                println!("Rotation:  {:.1}° (facing {})", p.rotation, observer.facing);
                println!("Direction: {}", p.direction);
            }
            None => eprintln!("Invalid position"),
        },
    }

    Ok(())
}

fn build_poller(
    observer: Observer,
    radius: f64,
    lookup_config: &LookupConfig,
) -> Result<Arc<Poller>, Box<dyn std::error::Error>> {
    let enricher = Enricher::from_config(lookup_config)?;
    let tracker = Arc::new(FlightTracker::new(enricher));
    let source = Arc::new(AdsbClient::new(ClientConfig::default())?);
    let config = PollerConfig::default().with_radius(radius);

    Ok(Arc::new(Poller::new(tracker, source, observer, config)))
}

async fn watch(poller: Arc<Poller>, radius: f64, json: bool) {
    let observer = poller.observer();
    tracing::info!(
        "Watching {:.5},{:.5} facing {} within {} NM",
        observer.latitude,
        observer.longitude,
        observer.facing,
        radius
    );

    let mut views = poller.subscribe();
    let run_handle = tokio::spawn(Arc::clone(&poller).run());

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if json {
                    match serde_json::to_string(&*view) {
                        Ok(line) => println!("{}", line),
                        Err(e) => tracing::error!("Failed to encode view: {}", e),
                    }
                } else {
                    report(&view, &observer, radius);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    poller.stop();
    let _ = run_handle.await;

    let s = poller.stats().snapshot();
    tracing::info!(
        "Stats: cycles={}, arrivals={}, skipped={}, errors={}",
        s.cycles,
        s.arrivals,
        s.skipped,
        s.errors
    );
}

fn report(view: &FlightView, observer: &Observer, radius: f64) {
    if let Some(ref error) = view.error {
        tracing::warn!("Showing last known state: {}", error);
        return;
    }

    tracing::info!("{} aircraft in range", view.total);

    for arrival in &view.new_flights_with_info {
        let name = arrival.flight.callsign().unwrap_or(&arrival.hex_code);
        let route = arrival
            .info
            .as_ref()
            .map(describe_route)
            .unwrap_or_else(|| "route unknown".to_string());

        match Placement::for_observation(observer, &arrival.flight, radius) {
            Some(p) => tracing::info!(
                "New flight {}: {}, {} ({:.1} NM)",
                name,
                route,
                p.direction,
                p.distance_nm
            ),
            None => tracing::info!("New flight {}: {}", name, route),
        }
    }
}

fn describe_route(info: &RouteInfo) -> String {
    let end = |airport: &Option<flightclock::Airport>| {
        airport
            .as_ref()
            .map(|a| {
                if a.region_name.is_empty() {
                    a.name.clone()
                } else {
                    a.region_name.clone()
                }
            })
            .unwrap_or_else(|| "?".to_string())
    };

    match (&info.origin, &info.destination, &info.route) {
        (None, None, Some(route)) => route.clone(),
        (None, None, None) => "route unknown".to_string(),
        (origin, destination, _) => format!("{} → {}", end(origin), end(destination)),
    }
}

fn print_table(view: &FlightView, radius: f64) {
    let observer = view.user_location;
    println!(
        "{:<8} {:<9} {:>7} {:>6} {:>8}  {}",
        "HEX", "FLIGHT", "ALT", "NM", "BEARING", "DIRECTION"
    );

    let mut rows: Vec<(&AircraftObservation, Option<Placement>)> = view
        .flights
        .iter()
        .map(|a| (a, Placement::for_observation(&observer, a, radius)))
        .collect();
    rows.sort_by(|a, b| {
        let da = a.1.map_or(f64::MAX, |p| p.distance_nm);
        let db = b.1.map_or(f64::MAX, |p| p.distance_nm);
        da.total_cmp(&db)
    });

    for (aircraft, placement) in rows {
        let alt = if aircraft.on_ground() {
            "ground".to_string()
        } else {
            aircraft
                .altitude_ft()
                .map(|a| format!("{:.0}", a))
                .unwrap_or_else(|| "-".to_string())
        };
        let (nm, brg, dir) = match placement {
            Some(p) => (
                format!("{:.1}", p.distance_nm),
                format!("{:.0}", p.bearing),
                p.direction.to_string(),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        println!(
            "{:<8} {:<9} {:>7} {:>6} {:>8}  {}",
            aircraft.hex,
            aircraft.callsign().unwrap_or("-"),
            alt,
            nm,
            brg,
            dir
        );
    }

    println!("{} aircraft", view.total);
}
