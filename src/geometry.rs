//! Bearing, distance and observer-relative direction.
//!
//! All inputs are decimal degrees. Nothing here validates coordinates:
//! non-finite input propagates as NaN, so callers filter observations
//! (see [`crate::filter`]) before placing them.

use crate::types::{AircraftObservation, Facing, Observer};
use serde::Serialize;
use std::fmt;

/// Mean Earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Initial great-circle bearing from the first point to the second, in `[0, 360)`.
pub fn bearing(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> f64 {
    let phi1 = from_lat.to_radians();
    let phi2 = to_lat.to_radians();
    let delta_lambda = (to_lon - from_lon).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Great-circle (haversine) distance in nautical miles.
pub fn distance(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> f64 {
    let phi1 = from_lat.to_radians();
    let phi2 = to_lat.to_radians();
    let delta_phi = (to_lat - from_lat).to_radians();
    let delta_lambda = (to_lon - from_lon).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for near-antipodal points.
    let c = 2.0 * a.sqrt().clamp(0.0, 1.0).asin();

    EARTH_RADIUS_NM * c
}

/// Degrees for a compass label. Unrecognized labels map to north.
pub fn facing_to_degrees(label: &str) -> f64 {
    Facing::from_label(label).degrees()
}

/// How far clockwise from straight ahead the target lies, in `[0, 360)`.
pub fn relative_rotation(observer: &Observer, target_lat: f64, target_lon: f64) -> f64 {
    let to_target = bearing(
        observer.latitude,
        observer.longitude,
        target_lat,
        target_lon,
    );
    normalize_degrees(to_target - observer.facing.degrees())
}

/// Wrap any finite angle into `[0, 360)`.
pub fn normalize_degrees(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Eight 45° sectors around the observer, centred on ahead/right/behind/left
/// and the diagonals between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum RelativeDirection {
    Ahead,
    AheadRight,
    Right,
    BehindRight,
    Behind,
    BehindLeft,
    Left,
    AheadLeft,
}

impl RelativeDirection {
    pub const ALL: [RelativeDirection; 8] = [
        RelativeDirection::Ahead,
        RelativeDirection::AheadRight,
        RelativeDirection::Right,
        RelativeDirection::BehindRight,
        RelativeDirection::Behind,
        RelativeDirection::BehindLeft,
        RelativeDirection::Left,
        RelativeDirection::AheadLeft,
    ];

    /// Sector for a relative rotation. Sector boundaries sit at `22.5 + 45k`
    /// degrees; each boundary belongs to the sector clockwise of it.
    /// Returns `None` for non-finite input.
    pub fn from_rotation(rotation: f64) -> Option<Self> {
        if !rotation.is_finite() {
            return None;
        }
        let shifted = normalize_degrees(rotation + 22.5);
        let sector = ((shifted / 45.0).floor() as usize).min(7);
        Some(Self::ALL[sector])
    }

    pub fn label(&self) -> &'static str {
        match self {
            RelativeDirection::Ahead => "straight ahead",
            RelativeDirection::AheadRight => "ahead and to the right",
            RelativeDirection::Right => "to your right",
            RelativeDirection::BehindRight => "behind and to the right",
            RelativeDirection::Behind => "behind you",
            RelativeDirection::BehindLeft => "behind and to the left",
            RelativeDirection::Left => "to your left",
            RelativeDirection::AheadLeft => "ahead and to the left",
        }
    }
}

impl From<RelativeDirection> for &'static str {
    fn from(dir: RelativeDirection) -> Self {
        dir.label()
    }
}

impl fmt::Display for RelativeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Label for a relative rotation, `None` for non-finite input.
pub fn relative_direction_label(rotation: f64) -> Option<&'static str> {
    RelativeDirection::from_rotation(rotation).map(|d| d.label())
}

/// Position on a circular radar face.
///
/// Unit disc centred on the observer: `x` grows to the right, `y` grows
/// downwards (screen convention), straight ahead is `(0, -1)` at full range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadarPoint {
    pub x: f64,
    pub y: f64,
}

/// Place a target on the radar face. Targets beyond `range_nm` are pinned to the rim.
pub fn radar_point(rotation: f64, distance_nm: f64, range_nm: f64) -> RadarPoint {
    let ratio = if range_nm > 0.0 {
        (distance_nm / range_nm).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let angle = (rotation - 90.0).to_radians();
    RadarPoint {
        x: angle.cos() * ratio,
        y: angle.sin() * ratio,
    }
}

/// Everything the display needs to draw one aircraft relative to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Placement {
    pub bearing: f64,
    pub distance_nm: f64,
    pub rotation: f64,
    pub direction: RelativeDirection,
    pub point: RadarPoint,
}

impl Placement {
    /// Compute the placement of a target position, `None` if any input is non-finite.
    pub fn compute(observer: &Observer, lat: f64, lon: f64, range_nm: f64) -> Option<Self> {
        let rotation = relative_rotation(observer, lat, lon);
        let direction = RelativeDirection::from_rotation(rotation)?;
        let distance_nm = distance(observer.latitude, observer.longitude, lat, lon);

        Some(Self {
            bearing: bearing(observer.latitude, observer.longitude, lat, lon),
            distance_nm,
            rotation,
            direction,
            point: radar_point(rotation, distance_nm, range_nm),
        })
    }

    pub fn for_observation(
        observer: &Observer,
        aircraft: &AircraftObservation,
        range_nm: f64,
    ) -> Option<Self> {
        let (lat, lon) = aircraft.position()?;
        Self::compute(observer, lat, lon, range_nm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn approx(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_bearing_cardinals() {
        assert!(approx(bearing(0.0, 0.0, 1.0, 0.0), 0.0, EPS));
        assert!(approx(bearing(0.0, 0.0, 0.0, 1.0), 90.0, EPS));
        assert!(approx(bearing(0.0, 0.0, -1.0, 0.0), 180.0, EPS));
        assert!(approx(bearing(0.0, 0.0, 0.0, -1.0), 270.0, EPS));
    }

    #[test]
    fn test_bearing_range() {
        let points = [
            (56.0, -3.6),
            (-33.9, 151.2),
            (89.9, 0.0),
            (-89.9, 179.9),
            (0.0, -180.0),
            (40.6, -73.8),
        ];
        for &(a_lat, a_lon) in &points {
            for &(b_lat, b_lon) in &points {
                let b = bearing(a_lat, a_lon, b_lat, b_lon);
                assert!((0.0..360.0).contains(&b), "bearing {} out of range", b);
            }
        }
    }

    #[test]
    fn test_distance_zero_and_symmetric() {
        assert_eq!(distance(56.0, -3.5, 56.0, -3.5), 0.0);
        assert_eq!(distance(-12.3, 100.0, -12.3, 100.0), 0.0);

        let d1 = distance(55.95, -3.37, 51.47, -0.45);
        let d2 = distance(51.47, -0.45, 55.95, -3.37);
        assert!(approx(d1, d2, EPS));
        assert!(d1 > 0.0);
    }

    #[test]
    fn test_distance_known_values() {
        // One degree of latitude is 60 NM on this sphere, near enough.
        assert!(approx(distance(0.0, 0.0, 1.0, 0.0), 60.04, 0.01));
        // LAX to JFK, roughly 2145 NM.
        let d = distance(33.9425, -118.4081, 40.6413, -73.7781);
        assert!(approx(d, 2145.0, 10.0), "got {}", d);
    }

    #[test]
    fn test_facing_to_degrees() {
        assert_eq!(facing_to_degrees("N"), 0.0);
        assert_eq!(facing_to_degrees("se"), 135.0);
        assert_eq!(facing_to_degrees("NW"), 315.0);
        assert_eq!(facing_to_degrees("nonsense"), 0.0);
        assert_eq!(facing_to_degrees(""), 0.0);
    }

    #[test]
    fn test_due_east_target() {
        let target = (56.0, -3.5);
        let north = Observer::new(56.0, -3.6, Facing::N);

        let b = bearing(56.0, -3.6, target.0, target.1);
        assert!(approx(b, 90.0, 0.1), "bearing {}", b);

        let rot = relative_rotation(&north, target.0, target.1);
        assert!(approx(rot, 90.0, 0.1), "rotation {}", rot);
        assert_eq!(relative_direction_label(rot), Some("to your right"));

        let east = Observer::new(56.0, -3.6, Facing::E);
        let rot = relative_rotation(&east, target.0, target.1);
        assert!(rot < 0.1 || rot > 359.9, "rotation {}", rot);
        assert_eq!(relative_direction_label(rot), Some("straight ahead"));
    }

    #[test]
    fn test_rotation_range() {
        for facing in ["N", "NE", "E", "SE", "S", "SW", "W", "NW"] {
            let observer = Observer::new(56.0, -3.6, Facing::from_label(facing));
            for step in 0..36 {
                let angle = (step as f64 * 10.0).to_radians();
                let rot = relative_rotation(
                    &observer,
                    56.0 + 0.1 * angle.cos(),
                    -3.6 + 0.1 * angle.sin(),
                );
                assert!((0.0..360.0).contains(&rot), "rotation {} out of range", rot);
            }
        }
    }

    #[test]
    fn test_label_sectors() {
        let expected = [
            (0.0, "straight ahead"),
            (22.4, "straight ahead"),
            (22.5, "ahead and to the right"),
            (67.5, "to your right"),
            (112.5, "behind and to the right"),
            (157.5, "behind you"),
            (202.5, "behind and to the left"),
            (247.5, "to your left"),
            (292.5, "ahead and to the left"),
            (337.4, "ahead and to the left"),
            (337.5, "straight ahead"),
            (359.99, "straight ahead"),
        ];
        for (rot, label) in expected {
            assert_eq!(relative_direction_label(rot), Some(label), "rotation {}", rot);
        }
    }

    #[test]
    fn test_label_partition() {
        // Walk the circle in tenths of a degree: exactly eight contiguous runs.
        let mut changes = Vec::new();
        let mut prev = RelativeDirection::from_rotation(0.0).unwrap();
        for i in 1..3600 {
            let rot = i as f64 / 10.0;
            let dir = RelativeDirection::from_rotation(rot).unwrap();
            if dir != prev {
                changes.push(rot);
                prev = dir;
            }
        }
        let boundaries: Vec<f64> = (0..8).map(|k| 22.5 + 45.0 * k as f64).collect();
        assert_eq!(changes.len(), 8);
        for (got, want) in changes.iter().zip(&boundaries) {
            assert!(approx(*got, *want, 1e-9), "boundary {} vs {}", got, want);
        }
    }

    #[test]
    fn test_non_finite_propagates() {
        assert!(bearing(f64::NAN, 0.0, 1.0, 1.0).is_nan());
        assert!(distance(0.0, f64::INFINITY, 1.0, 1.0).is_nan());
        assert_eq!(relative_direction_label(f64::NAN), None);

        let observer = Observer::new(56.0, -3.6, Facing::N);
        assert!(Placement::compute(&observer, f64::NAN, 0.0, 10.0).is_none());
    }

    #[test]
    fn test_radar_point() {
        let ahead = radar_point(0.0, 5.0, 10.0);
        assert!(approx(ahead.x, 0.0, EPS));
        assert!(approx(ahead.y, -0.5, EPS));

        let right = radar_point(90.0, 10.0, 10.0);
        assert!(approx(right.x, 1.0, EPS));
        assert!(approx(right.y, 0.0, EPS));

        let far = radar_point(180.0, 50.0, 10.0);
        assert!(approx(far.y, 1.0, EPS));

        let centre = radar_point(45.0, 3.0, 0.0);
        assert!(approx(centre.x, 0.0, EPS) && approx(centre.y, 0.0, EPS));
    }

    #[test]
    fn test_placement_for_observation() {
        let observer = Observer::new(56.0, -3.6, Facing::N);
        let aircraft = AircraftObservation::new("a1", 56.0, -3.5);
        let p = Placement::for_observation(&observer, &aircraft, 10.0).unwrap();
        assert_eq!(p.direction, RelativeDirection::Right);
        assert!(approx(p.distance_nm, 3.36, 0.05), "distance {}", p.distance_nm);
        assert!(p.point.x > 0.0);

        let mut no_pos = aircraft.clone();
        no_pos.lat = None;
        assert!(Placement::for_observation(&observer, &no_pos, 10.0).is_none());
    }
}
