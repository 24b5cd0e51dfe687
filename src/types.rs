//! Core data types for the flight tracker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One aircraft as reported by the feed at snapshot time.
///
/// Only the identifier, callsign and position are interpreted. Everything else
/// the feed sends (altitude, speed, squawk, ...) is kept verbatim in
/// [`telemetry`](Self::telemetry) for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftObservation {
    /// ICAO 24-bit address as a hex string, the tracking key.
    #[serde(default)]
    pub hex: String,
    /// Callsign / flight number, often right-padded with spaces by the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(flatten)]
    pub telemetry: BTreeMap<String, Value>,
}

impl AircraftObservation {
    /// Create an observation with a position and nothing else.
    pub fn new(hex: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            hex: hex.into(),
            flight: None,
            lat: Some(lat),
            lon: Some(lon),
            telemetry: BTreeMap::new(),
        }
    }

    pub fn with_flight(mut self, flight: impl Into<String>) -> Self {
        self.flight = Some(flight.into());
        self
    }

    pub fn with_telemetry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.telemetry.insert(key.into(), value);
        self
    }

    /// Trimmed callsign, `None` when absent or blank.
    pub fn callsign(&self) -> Option<&str> {
        self.flight
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// `(lat, lon)` when both are present.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Barometric altitude in feet. The feed reports `"ground"` for taxiing aircraft.
    pub fn altitude_ft(&self) -> Option<f64> {
        self.telemetry.get("alt_baro").and_then(Value::as_f64)
    }

    /// True when the barometric altitude reads "ground".
    pub fn on_ground(&self) -> bool {
        matches!(self.telemetry.get("alt_baro"), Some(Value::String(s)) if s == "ground")
    }

    /// Ground speed in knots.
    pub fn ground_speed(&self) -> Option<f64> {
        self.telemetry.get("gs").and_then(Value::as_f64)
    }

    /// Track over ground in degrees.
    pub fn track(&self) -> Option<f64> {
        self.telemetry.get("track").and_then(Value::as_f64)
    }

    pub fn squawk(&self) -> Option<&str> {
        self.telemetry.get("squawk").and_then(Value::as_str)
    }

    pub fn registration(&self) -> Option<&str> {
        self.telemetry.get("r").and_then(Value::as_str)
    }

    pub fn aircraft_type(&self) -> Option<&str> {
        self.telemetry.get("t").and_then(Value::as_str)
    }
}

/// One point-in-time batch of aircraft from the feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub aircraft: Vec<AircraftObservation>,
    /// Number of aircraft the server says it returned.
    #[serde(default)]
    pub result_count: u32,
    /// Server timestamp, milliseconds since the epoch. Some feeds send a
    /// fractional value.
    #[serde(default)]
    pub now: f64,
    /// Server processing time in milliseconds.
    #[serde(default)]
    pub ptime: f64,
}

/// The eight compass points, or any other heading in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Facing {
    #[default]
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
    Degrees(f64),
}

impl Facing {
    /// Parse a compass label, falling back to north for anything unrecognized.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Facing::N)
    }

    /// Heading in degrees clockwise from north.
    pub fn degrees(&self) -> f64 {
        match *self {
            Facing::N => 0.0,
            Facing::NE => 45.0,
            Facing::E => 90.0,
            Facing::SE => 135.0,
            Facing::S => 180.0,
            Facing::SW => 225.0,
            Facing::W => 270.0,
            Facing::NW => 315.0,
            Facing::Degrees(d) => d.rem_euclid(360.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFacing(pub String);

impl fmt::Display for UnknownFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown facing direction: {:?}", self.0)
    }
}

impl std::error::Error for UnknownFacing {}

impl FromStr for Facing {
    type Err = UnknownFacing;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "N" => Ok(Facing::N),
            "NE" => Ok(Facing::NE),
            "E" => Ok(Facing::E),
            "SE" => Ok(Facing::SE),
            "S" => Ok(Facing::S),
            "SW" => Ok(Facing::SW),
            "W" => Ok(Facing::W),
            "NW" => Ok(Facing::NW),
            _ => trimmed
                .parse::<f64>()
                .ok()
                .filter(|d| d.is_finite())
                .map(Facing::Degrees)
                .ok_or_else(|| UnknownFacing(s.to_string())),
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::N => f.write_str("N"),
            Facing::NE => f.write_str("NE"),
            Facing::E => f.write_str("E"),
            Facing::SE => f.write_str("SE"),
            Facing::S => f.write_str("S"),
            Facing::SW => f.write_str("SW"),
            Facing::W => f.write_str("W"),
            Facing::NW => f.write_str("NW"),
            Facing::Degrees(d) => write!(f, "{}", d),
        }
    }
}

impl Serialize for Facing {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where the display stands and which way it faces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Observer {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "facingDirection")]
    pub facing: Facing,
}

impl Observer {
    pub fn new(latitude: f64, longitude: f64, facing: Facing) -> Self {
        Self {
            latitude,
            longitude,
            facing,
        }
    }
}

/// Airport record as served by the lookup services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub region_name: String,
    #[serde(default)]
    pub iata: String,
    #[serde(default)]
    pub icao: String,
    #[serde(rename = "airport", default)]
    pub name: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

/// Resolved origin/destination for one flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// The trimmed callsign that was looked up.
    pub flight: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Airport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Airport>,
    /// Raw route string, e.g. `EGPH-LEMG`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
}

impl RouteInfo {
    /// A lookup that found nothing.
    pub fn unresolved(flight: impl Into<String>) -> Self {
        Self {
            flight: flight.into(),
            origin: None,
            destination: None,
            route: None,
        }
    }

    /// True when at least one airport is known.
    pub fn is_resolved(&self) -> bool {
        self.origin.is_some() || self.destination.is_some()
    }
}

/// A newly arrived aircraft merged with its route, if one was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrivalView {
    pub hex_code: String,
    pub flight: AircraftObservation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<RouteInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_observation_keeps_telemetry() {
        let raw = json!({
            "hex": "4ca7b5",
            "flight": "RYR12AB ",
            "lat": 55.95,
            "lon": -3.37,
            "alt_baro": 3200,
            "gs": 180.4,
            "squawk": "4615",
            "r": "EI-DCL",
            "t": "B738",
        });

        let obs: AircraftObservation = serde_json::from_value(raw).unwrap();
        assert_eq!(obs.hex, "4ca7b5");
        assert_eq!(obs.callsign(), Some("RYR12AB"));
        assert_eq!(obs.position(), Some((55.95, -3.37)));
        assert_eq!(obs.altitude_ft(), Some(3200.0));
        assert_eq!(obs.ground_speed(), Some(180.4));
        assert_eq!(obs.squawk(), Some("4615"));
        assert_eq!(obs.registration(), Some("EI-DCL"));
        assert_eq!(obs.aircraft_type(), Some("B738"));
        assert!(!obs.telemetry.contains_key("hex"));

        let back = serde_json::to_value(&obs).unwrap();
        assert_eq!(back["alt_baro"], json!(3200));
        assert_eq!(back["flight"], json!("RYR12AB "));
    }

    #[test]
    fn test_ground_altitude() {
        let obs: AircraftObservation =
            serde_json::from_value(json!({"hex": "abc123", "alt_baro": "ground"})).unwrap();
        assert!(obs.on_ground());
        assert_eq!(obs.altitude_ft(), None);
        assert_eq!(obs.position(), None);
    }

    #[test]
    fn test_blank_callsign() {
        let obs = AircraftObservation::new("abc123", 1.0, 2.0).with_flight("   ");
        assert_eq!(obs.callsign(), None);
    }

    #[test]
    fn test_snapshot_decode() {
        let raw = json!({
            "now": 1718000000000u64,
            "resultCount": 1,
            "ptime": 3,
            "aircraft": [{"hex": "a1b2c3", "lat": 56.0, "lon": -3.5}],
        });
        let snap: Snapshot = serde_json::from_value(raw).unwrap();
        assert_eq!(snap.result_count, 1);
        assert_eq!(snap.now, 1718000000000.0);
        assert_eq!(snap.aircraft.len(), 1);
    }

    #[test]
    fn test_snapshot_decode_fractional_times() {
        let raw = json!({
            "now": 1718000000000.5,
            "resultCount": 1,
            "ptime": 0.42,
            "aircraft": [{"hex": "a1b2c3", "lat": 56.0, "lon": -3.5}],
        });
        let snap: Snapshot = serde_json::from_value(raw).unwrap();
        assert_eq!(snap.now, 1718000000000.5);
        assert_eq!(snap.ptime, 0.42);
        assert_eq!(snap.aircraft.len(), 1);
    }

    #[test]
    fn test_facing_parse() {
        assert_eq!("ne".parse::<Facing>().unwrap(), Facing::NE);
        assert_eq!(" W ".parse::<Facing>().unwrap(), Facing::W);
        assert_eq!("100".parse::<Facing>().unwrap(), Facing::Degrees(100.0));
        assert!("up".parse::<Facing>().is_err());
        assert_eq!(Facing::from_label("sideways"), Facing::N);
    }

    #[test]
    fn test_facing_degrees() {
        let labels = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
        for (i, label) in labels.iter().enumerate() {
            assert_eq!(Facing::from_label(label).degrees(), i as f64 * 45.0);
        }
        assert_eq!(Facing::Degrees(-90.0).degrees(), 270.0);
        assert_eq!(Facing::Degrees(360.0).degrees(), 0.0);
    }

    #[test]
    fn test_airport_decode() {
        let raw = json!({
            "country_code": "ES",
            "region_name": "Andalucia",
            "iata": "AGP",
            "icao": "LEMG",
            "airport": "Malaga Airport",
            "latitude": 36.6749,
            "longitude": -4.49911,
        });
        let airport: Airport = serde_json::from_value(raw).unwrap();
        assert_eq!(airport.name, "Malaga Airport");
        assert_eq!(airport.icao, "LEMG");
    }

    #[test]
    fn test_unresolved_route() {
        let info = RouteInfo::unresolved("BAW123");
        assert!(!info.is_resolved());
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"flight": "BAW123"})
        );
    }
}
