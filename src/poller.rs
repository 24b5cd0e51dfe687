//! Polling orchestrator.
//!
//! Drives one [`FlightTracker`] from a [`SnapshotSource`] on a single timer
//! whose period is re-read at every scheduling decision, publishes the
//! consolidated view after every cycle and keeps the arrival alert flag.
//!
//! At most one cycle runs at a time: scheduled ticks and manual refreshes
//! that find a cycle in flight are skipped, never queued.

use crate::client::{ClientError, SearchArea, SnapshotSource};
use crate::tracker::FlightTracker;
use crate::types::{AircraftObservation, ArrivalView, Observer};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, watch, Notify};
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Failed to fetch flight data: {0}")]
    Client(#[from] ClientError),
    #[error("No aircraft data received")]
    NoAircraft,
}

/// What the display is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Clock,
    Radar,
}

/// Poll slowly while idle, quickly while something is worth watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingPolicy {
    pub idle: Duration,
    pub active: Duration,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(30),
            active: Duration::from_secs(5),
        }
    }
}

impl PollingPolicy {
    /// Interval to wait before the next tick.
    pub fn interval(&self, mode: DisplayMode, alert_active: bool) -> Duration {
        match mode {
            DisplayMode::Radar => self.active,
            DisplayMode::Clock if alert_active => self.active,
            DisplayMode::Clock => self.idle,
        }
    }
}

/// How the poller picks its next interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Fixed(Duration),
    /// Follow the [`PollingPolicy`] for this display mode and the alert state.
    Adaptive(DisplayMode),
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Feed query radius around the observer
    pub radius_nm: f64,
    pub policy: PollingPolicy,
    pub cadence: Cadence,
    /// Clear the arrival alert this long after it was raised. `None` leaves it
    /// to the consumer.
    pub alert_timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            radius_nm: 10.0,
            policy: PollingPolicy::default(),
            cadence: Cadence::Adaptive(DisplayMode::Clock),
            alert_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl PollerConfig {
    /// Set the feed query radius.
    pub fn with_radius(mut self, radius_nm: f64) -> Self {
        self.radius_nm = radius_nm;
        self
    }

    /// Set the idle/active intervals.
    pub fn with_policy(mut self, policy: PollingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the initial cadence.
    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    /// Set how long an arrival alert stays raised.
    pub fn with_alert_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.alert_timeout = timeout;
        self
    }
}

/// Consolidated view of the last cycle, shaped for presentation layers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightView {
    pub flights: Vec<AircraftObservation>,
    pub new_flights: Vec<String>,
    pub new_flights_with_info: Vec<ArrivalView>,
    pub total: usize,
    /// Feed server time of the snapshot, milliseconds since the epoch.
    pub timestamp: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub user_location: Observer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FlightView {
    fn empty(observer: Observer) -> Self {
        Self {
            flights: Vec::new(),
            new_flights: Vec::new(),
            new_flights_with_info: Vec::new(),
            total: 0,
            timestamp: 0,
            last_update: None,
            user_location: observer,
            error: None,
        }
    }
}

/// Statistics for the poller.
#[derive(Debug, Default)]
pub struct PollerStats {
    pub cycles: AtomicU64,
    pub skipped: AtomicU64,
    pub errors: AtomicU64,
    pub arrivals: AtomicU64,
    pub last_cycle_ms: AtomicU64,
}

impl PollerStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            arrivals: self.arrivals.load(Ordering::Relaxed),
            last_cycle_ms: self.last_cycle_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub skipped: u64,
    pub errors: u64,
    pub arrivals: u64,
    pub last_cycle_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { arrivals: Vec<String> },
    /// Another cycle was in flight.
    Skipped,
}

pub struct Poller {
    tracker: Arc<FlightTracker>,
    source: Arc<dyn SnapshotSource>,
    observer: Observer,
    config: PollerConfig,
    cadence: Mutex<Cadence>,
    cycle_lock: tokio::sync::Mutex<()>,
    alert_raised_at: Mutex<Option<Instant>>,
    retry_after: Mutex<Option<Duration>>,
    view: watch::Sender<Arc<FlightView>>,
    stats: Arc<PollerStats>,
    stopped: AtomicBool,
    stop_signal: Notify,
}

impl Poller {
    /// Create a new poller. Nothing is fetched until [`run`](Self::run) or
    /// [`refresh`](Self::refresh).
    pub fn new(
        tracker: Arc<FlightTracker>,
        source: Arc<dyn SnapshotSource>,
        observer: Observer,
        config: PollerConfig,
    ) -> Self {
        let (view, _) = watch::channel(Arc::new(FlightView::empty(observer)));
        Self {
            tracker,
            source,
            observer,
            cadence: Mutex::new(config.cadence),
            config,
            cycle_lock: tokio::sync::Mutex::new(()),
            alert_raised_at: Mutex::new(None),
            retry_after: Mutex::new(None),
            view,
            stats: Arc::new(PollerStats::new()),
            stopped: AtomicBool::new(false),
            stop_signal: Notify::new(),
        }
    }

    /// The tracker this poller feeds.
    pub fn tracker(&self) -> &Arc<FlightTracker> {
        &self.tracker
    }

    /// Where the observer stands and which way the display faces.
    pub fn observer(&self) -> Observer {
        self.observer
    }

    /// Get stats reference.
    pub fn stats(&self) -> Arc<PollerStats> {
        Arc::clone(&self.stats)
    }

    /// The view published by the last cycle.
    pub fn latest(&self) -> Arc<FlightView> {
        self.view.borrow().clone()
    }

    /// Receiver that is notified whenever a new view is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FlightView>> {
        self.view.subscribe()
    }

    /// Poll at a fixed interval from the next scheduling decision on.
    pub fn set_interval(&self, interval: Duration) {
        *self.cadence.lock() = Cadence::Fixed(interval);
    }

    /// Poll according to the configured policy for this display mode.
    pub fn set_display_mode(&self, mode: DisplayMode) {
        *self.cadence.lock() = Cadence::Adaptive(mode);
    }

    /// The interval the next scheduling decision would use.
    pub fn interval(&self) -> Duration {
        match *self.cadence.lock() {
            Cadence::Fixed(interval) => interval,
            Cadence::Adaptive(mode) => self.config.policy.interval(mode, self.has_arrival_alert()),
        }
    }

    /// True while an arrival alert is raised and younger than `alert_timeout`.
    pub fn has_arrival_alert(&self) -> bool {
        match *self.alert_raised_at.lock() {
            Some(raised) => self
                .config
                .alert_timeout
                .map_or(true, |timeout| raised.elapsed() < timeout),
            None => false,
        }
    }

    /// Acknowledge the current arrival alert.
    pub fn clear_arrival_alert(&self) {
        *self.alert_raised_at.lock() = None;
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stop scheduling cycles. A cycle already in flight runs to completion
    /// but its view is not published.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop_signal.notify_one();
    }

    /// Run the scheduling loop until [`stop`](Self::stop) is called.
    ///
    /// The first cycle starts immediately. Each tick spawns its cycle so a slow
    /// cycle makes later ticks skip rather than drift the schedule. The wait is
    /// measured from the start of the tick and picked again once the cycle
    /// settles, so an alert or a `Retry-After` it produced shapes the very next
    /// wait.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            "Starting poller at {:.5},{:.5} radius {} NM",
            self.observer.latitude,
            self.observer.longitude,
            self.config.radius_nm
        );

        while !self.is_stopped() {
            self.expire_alert();

            let tick = Instant::now();
            let (done_tx, mut done_rx) = oneshot::channel();

            let poller = Arc::clone(&self);
            tokio::spawn(async move {
                match poller.refresh().await {
                    Ok(CycleOutcome::Completed { arrivals }) if !arrivals.is_empty() => {
                        tracing::info!("New flights detected: {:?}", arrivals);
                    }
                    Ok(CycleOutcome::Skipped) => {
                        tracing::debug!("Previous cycle still running, tick skipped");
                    }
                    _ => {}
                }
                let _ = done_tx.send(());
            });

            // Provisional until the cycle settles.
            let mut deadline = tick + self.interval();
            let mut settled = false;

            let stopped = loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break false,
                    _ = &mut done_rx, if !settled => {
                        settled = true;
                        let wait = self.next_wait();
                        tracing::debug!("Next poll in {:?}", wait);
                        deadline = tick + wait;
                    }
                    _ = self.stop_signal.notified() => break true,
                }
            };
            if stopped {
                break;
            }
        }

        tracing::info!("Poller stopped");
    }

    /// Run one cycle now, unless one is already in flight.
    pub async fn refresh(&self) -> Result<CycleOutcome, PollError> {
        let _guard = match self.cycle_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                return Ok(CycleOutcome::Skipped);
            }
        };

        let start = Instant::now();
        let result = self.cycle().await;
        let elapsed = start.elapsed();

        self.stats
            .last_cycle_ms
            .store(elapsed.as_millis() as u64, Ordering::Relaxed);

        if self.is_stopped() {
            tracing::debug!("Poller stopped during cycle, result discarded");
            return result.map(|(arrivals, _)| CycleOutcome::Completed { arrivals });
        }

        match result {
            Ok((arrivals, feed_time)) => {
                self.stats.cycles.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .arrivals
                    .fetch_add(arrivals.len() as u64, Ordering::Relaxed);

                tracing::debug!(
                    "Cycle done in {:?}: {} tracked, {} new",
                    elapsed,
                    self.tracker.count(),
                    arrivals.len()
                );

                if !arrivals.is_empty() {
                    *self.alert_raised_at.lock() = Some(Instant::now());
                }
                self.publish(feed_time);

                Ok(CycleOutcome::Completed { arrivals })
            }
            Err(e) => {
                tracing::error!("Cycle failed: {}", e);
                self.stats.errors.fetch_add(1, Ordering::Relaxed);

                if let PollError::Client(ClientError::RateLimited { retry_after }) = &e {
                    *self.retry_after.lock() = *retry_after;
                }

                let mut stale = FlightView::clone(&self.latest());
                stale.error = Some(e.to_string());
                self.view.send_replace(Arc::new(stale));

                Err(e)
            }
        }
    }

    async fn cycle(&self) -> Result<(Vec<String>, u64), PollError> {
        let area = SearchArea::new(
            self.observer.latitude,
            self.observer.longitude,
            self.config.radius_nm,
        );
        let snapshot = self.source.fetch(area).await?;

        tracing::debug!(
            "Fetched {} aircraft (server reported {})",
            snapshot.aircraft.len(),
            snapshot.result_count
        );

        if snapshot.aircraft.is_empty() {
            return Err(PollError::NoAircraft);
        }

        let arrivals = self.tracker.update(snapshot.aircraft).await;
        // Saturating cast; NaN becomes 0.
        Ok((arrivals, snapshot.now as u64))
    }

    fn publish(&self, feed_time: u64) {
        let view = FlightView {
            flights: self.tracker.aircraft(),
            new_flights: self.tracker.arrivals(),
            new_flights_with_info: self.tracker.arrivals_with_routes(),
            total: self.tracker.count(),
            timestamp: feed_time,
            last_update: self.tracker.last_update(),
            user_location: self.observer,
            error: None,
        };
        self.view.send_replace(Arc::new(view));
    }

    fn expire_alert(&self) {
        let Some(timeout) = self.config.alert_timeout else {
            return;
        };
        let mut raised = self.alert_raised_at.lock();
        if raised.is_some_and(|at| at.elapsed() >= timeout) {
            tracing::debug!("Arrival alert expired");
            *raised = None;
        }
    }

    fn next_wait(&self) -> Duration {
        let interval = self.interval();
        match self.retry_after.lock().take() {
            Some(retry) if retry > interval => {
                tracing::warn!("Rate limited, waiting {:?}", retry);
                retry
            }
            _ => interval,
        }
    }
}
