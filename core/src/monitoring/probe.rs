//! The probe interface the sampler reads from.
//!
//! [`LocalProbes`](super::local::LocalProbes) talks to the board firmware and
//! the OS; tests drive the sampler with stub implementations.

use crate::errors::ProbeError;
use crate::monitoring::types::{FirmwareReading, MemoryReading, ProcessEntry};

/// A set of read-only sensors.
///
/// Every method either produces its current value or fails with
/// [`ProbeError`]; the sampler substitutes the unknown value on failure.
/// Methods take `&mut self` because some probes (CPU load, process CPU
/// usage) are computed from deltas against the previous call.
pub trait ProbeSet: Send {
    /// Query the firmware for temperature, ARM clock, core voltage and the
    /// throttle word. Any failed step fails the whole group.
    fn firmware(&mut self) -> Result<FirmwareReading, ProbeError>;

    /// Cooling-device step, or `None` when the board has no cooling device.
    fn cooling_state(&mut self) -> Result<Option<u32>, ProbeError>;

    /// CPU load across all cores since the previous call, in percent.
    fn cpu_load_pct(&mut self) -> Result<f64, ProbeError>;

    fn memory(&mut self) -> Result<MemoryReading, ProbeError>;

    /// Used percentage of the root filesystem.
    fn disk_used_pct(&mut self) -> Result<f64, ProbeError>;

    /// Address the host name resolves to.
    fn local_ip(&mut self) -> Result<String, ProbeError>;

    /// Seconds since boot.
    fn uptime_s(&mut self) -> Result<f64, ProbeError>;

    /// All running processes with their CPU usage since the previous call.
    fn processes(&mut self) -> Result<Vec<ProcessEntry>, ProbeError>;
}
