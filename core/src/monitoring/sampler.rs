//! Composes probe readings into complete [`Snapshot`]s.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::errors::ProbeError;
use crate::monitoring::parser::{bytes_to_mib, fan_pct_from_state, top_processes, whole_percent};
use crate::monitoring::probe::ProbeSet;
use crate::monitoring::types::{FirmwareReading, Snapshot, FALLBACK_IP};

/// Turns a [`ProbeSet`] into timestamped snapshots.
///
/// `fetch` reads every probe (slow cadence). `fetch_fast` refreshes only the
/// graphed metrics (firmware group and CPU load) and carries the remaining
/// fields over from the last full fetch, so both always return a complete
/// record.
pub struct Sampler<P: ProbeSet> {
    probes: P,
    epoch: Instant,
    top_n: usize,
    last_full: Snapshot,
    /// Last known firmware availability, for logging transitions only.
    firmware_available: Option<bool>,
}

impl<P: ProbeSet> Sampler<P> {
    pub fn new(probes: P, top_n: usize) -> Self {
        Self {
            probes,
            epoch: Instant::now(),
            top_n,
            last_full: Snapshot::default(),
            firmware_available: None,
        }
    }

    /// Read every probe.
    ///
    /// External command probes run first, then the in-process ones.
    pub fn fetch(&mut self) -> Snapshot {
        let firmware = self.read_firmware();
        let disk = self.probes.disk_used_pct();
        let ip_address = match firmware {
            Some(_) => or_unknown("ip", self.probes.local_ip(), FALLBACK_IP.to_string()),
            None => FALLBACK_IP.to_string(),
        };

        let fan_pct = or_unknown("cooling device", self.probes.cooling_state(), None)
            .map(fan_pct_from_state)
            .unwrap_or(0);
        let cpu_load_pct = or_unknown("cpu", self.probes.cpu_load_pct(), 0.0);
        let memory = or_unknown("memory", self.probes.memory(), Default::default());
        let uptime = or_unknown("uptime", self.probes.uptime_s(), 0.0);
        let processes = or_unknown("processes", self.probes.processes(), Vec::new());

        let firmware = firmware.unwrap_or_default();
        let snapshot = Snapshot {
            temperature_c: firmware.temperature_c,
            cpu_load_pct: cpu_load_pct.clamp(0.0, 100.0),
            clock_mhz: firmware.clock_mhz,
            voltage_v: firmware.voltage_v,
            throttle_state: firmware.throttle_state,
            fan_pct,
            ram_used_mib: bytes_to_mib(memory.used_bytes),
            ram_total_mib: bytes_to_mib(memory.total_bytes),
            disk_used_pct: whole_percent(or_unknown("disk", disk, 0.0)),
            ip_address,
            uptime_s: uptime.max(0.0) as u64,
            captured_at: self.epoch.elapsed(),
            top_processes: top_processes(processes, self.top_n),
        };

        self.last_full = snapshot.clone();
        snapshot
    }

    /// Refresh the graphed metrics only.
    pub fn fetch_fast(&mut self) -> Snapshot {
        let firmware = self.read_firmware();
        let cpu_load_pct = or_unknown("cpu", self.probes.cpu_load_pct(), 0.0);

        let ip_address = match firmware {
            Some(_) => self.last_full.ip_address.clone(),
            None => FALLBACK_IP.to_string(),
        };
        let firmware = firmware.unwrap_or_default();

        Snapshot {
            temperature_c: firmware.temperature_c,
            cpu_load_pct: cpu_load_pct.clamp(0.0, 100.0),
            clock_mhz: firmware.clock_mhz,
            voltage_v: firmware.voltage_v,
            throttle_state: firmware.throttle_state,
            ip_address,
            captured_at: self.epoch.elapsed(),
            ..self.last_full.clone()
        }
    }

    #[cfg(test)]
    pub(crate) fn probes_mut(&mut self) -> &mut P {
        &mut self.probes
    }

    fn read_firmware(&mut self) -> Option<FirmwareReading> {
        match self.probes.firmware() {
            Ok(reading) => {
                if self.firmware_available == Some(false) {
                    info!("Firmware queries available again");
                }
                self.firmware_available = Some(true);
                Some(reading)
            }
            Err(e) => {
                if self.firmware_available != Some(false) {
                    warn!("Firmware queries failed, reporting unknown values: {e}");
                }
                self.firmware_available = Some(false);
                None
            }
        }
    }
}

/// Unwrap a probe result, substituting `unknown` on failure.
fn or_unknown<T>(probe: &str, result: Result<T, ProbeError>, unknown: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            debug!("{probe} probe failed: {e}");
            unknown
        }
    }
}
