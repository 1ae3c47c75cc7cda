//! Shared test utilities for pimark-core integration tests.
//!
//! Provides a fixed-value probe set and helpers for inspecting the host
//! process table.

// Each integration test is compiled as its own crate, so not every test file
// uses every function from this shared module. Suppress dead_code warnings.
#![allow(dead_code)]

use pimark_core::errors::ProbeError;
use pimark_core::monitoring::{
    FirmwareReading, MemoryReading, ProbeSet, ProcessEntry, ThrottleState,
};

/// Probe set reporting a cool, idle board.
#[derive(Debug, Clone)]
pub struct FixedProbes {
    pub temperature_c: f64,
}

impl Default for FixedProbes {
    fn default() -> Self {
        Self {
            temperature_c: 48.0,
        }
    }
}

impl ProbeSet for FixedProbes {
    fn firmware(&mut self) -> Result<FirmwareReading, ProbeError> {
        Ok(FirmwareReading {
            temperature_c: self.temperature_c,
            clock_mhz: 1800,
            voltage_v: 0.85,
            throttle_state: ThrottleState::Ok,
        })
    }

    fn cooling_state(&mut self) -> Result<Option<u32>, ProbeError> {
        Ok(None)
    }

    fn cpu_load_pct(&mut self) -> Result<f64, ProbeError> {
        Ok(12.0)
    }

    fn memory(&mut self) -> Result<MemoryReading, ProbeError> {
        Ok(MemoryReading {
            used_bytes: 256 * 1_048_576,
            total_bytes: 1024 * 1_048_576,
        })
    }

    fn disk_used_pct(&mut self) -> Result<f64, ProbeError> {
        Ok(30.0)
    }

    fn local_ip(&mut self) -> Result<String, ProbeError> {
        Ok("10.0.0.7".into())
    }

    fn uptime_s(&mut self) -> Result<f64, ProbeError> {
        Ok(100.0)
    }

    fn processes(&mut self) -> Result<Vec<ProcessEntry>, ProbeError> {
        Ok(Vec::new())
    }
}

/// Whether any live process was started with exactly this argv.
#[cfg(target_os = "linux")]
pub fn process_with_argv_exists(argv: &[&str]) -> bool {
    let expected: Vec<u8> = argv
        .iter()
        .flat_map(|a| a.bytes().chain(std::iter::once(0)))
        .collect();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return false;
    };
    entries.flatten().any(|entry| {
        std::fs::read(entry.path().join("cmdline"))
            .map(|cmdline| cmdline == expected)
            .unwrap_or(false)
    })
}
