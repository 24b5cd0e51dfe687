//! Drops feed records that cannot be tracked or placed.

use crate::types::AircraftObservation;

/// A record is usable when it has a non-empty identifier and a finite,
/// in-range position.
pub fn is_valid(aircraft: &AircraftObservation) -> bool {
    if aircraft.hex.trim().is_empty() {
        return false;
    }
    match aircraft.position() {
        Some((lat, lon)) => {
            lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0 && lon.abs() <= 180.0
        }
        None => false,
    }
}

/// Keep only valid records, preserving feed order.
pub fn filter_valid<I>(aircraft: I) -> Vec<AircraftObservation>
where
    I: IntoIterator<Item = AircraftObservation>,
{
    aircraft.into_iter().filter(is_valid).collect()
}
