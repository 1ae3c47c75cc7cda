//! Thermal cutoff check.

use crate::monitoring::Snapshot;

/// Whether a running test must be stopped for safety.
///
/// Trips only when the temperature is strictly above the cutoff.
pub fn should_trip(snapshot: &Snapshot, running: bool, cutoff_c: f64) -> bool {
    running && snapshot.temperature_c > cutoff_c
}
