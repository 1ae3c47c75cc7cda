//! Telemetry data types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fallback address reported when host-name resolution fails.
pub const FALLBACK_IP: &str = "127.0.0.1";

/// Firmware-reported throttling indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThrottleState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "THROTTLED")]
    Throttled,
    #[default]
    #[serde(rename = "N/A")]
    Unknown,
}

impl ThrottleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Throttled => "THROTTLED",
            Self::Unknown => "N/A",
        }
    }
}

impl fmt::Display for ThrottleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the live process monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub name: String,
    pub cpu_pct: f64,
}

/// One complete reading of all live metrics.
///
/// Every field always holds a value: probes that fail contribute their
/// unknown representation (0, `N/A`, or [`FALLBACK_IP`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub temperature_c: f64,
    pub cpu_load_pct: f64,
    pub clock_mhz: u32,
    pub voltage_v: f64,
    pub throttle_state: ThrottleState,
    pub fan_pct: u8,
    pub ram_used_mib: u64,
    pub ram_total_mib: u64,
    pub disk_used_pct: u8,
    pub ip_address: String,
    pub uptime_s: u64,
    /// Monotonic offset from sampler creation.
    pub captured_at: Duration,
    /// Highest-CPU processes, descending by `cpu_pct`.
    pub top_processes: Vec<ProcessEntry>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            temperature_c: 0.0,
            cpu_load_pct: 0.0,
            clock_mhz: 0,
            voltage_v: 0.0,
            throttle_state: ThrottleState::Unknown,
            fan_pct: 0,
            ram_used_mib: 0,
            ram_total_mib: 0,
            disk_used_pct: 0,
            ip_address: FALLBACK_IP.to_string(),
            uptime_s: 0,
            captured_at: Duration::ZERO,
            top_processes: Vec::new(),
        }
    }
}

/// The four values answered by the board firmware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FirmwareReading {
    pub temperature_c: f64,
    pub clock_mhz: u32,
    pub voltage_v: f64,
    pub throttle_state: ThrottleState,
}

impl Default for FirmwareReading {
    fn default() -> Self {
        Self {
            temperature_c: 0.0,
            clock_mhz: 0,
            voltage_v: 0.0,
            throttle_state: ThrottleState::Unknown,
        }
    }
}

/// Memory usage in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryReading {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Cumulative CPU time counters parsed from the aggregate `cpu` line in `/proc/stat`.
#[derive(Debug, Clone, Default)]
pub struct CpuCounters {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuCounters {
    /// Total CPU time across all fields.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Idle CPU time (idle + iowait).
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}
