//! Probes for the local board: firmware queries, `/proc`, `/sys` and `df`.

use std::net::{IpAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use sysinfo::System;
use tracing::debug;

use crate::config::EngineConfig;
use crate::errors::ProbeError;
use crate::monitoring::parser::{
    cpu_percent_from_delta, parse_clock_mhz, parse_cooling_state, parse_cpu_line, parse_df_output,
    parse_meminfo, parse_temp, parse_throttled, parse_uptime, parse_volts,
};
use crate::monitoring::probe::ProbeSet;
use crate::monitoring::types::{CpuCounters, FirmwareReading, MemoryReading, ProcessEntry};

/// Upper bound for a single external command.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(200);

/// How often a running command is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Reads telemetry from the host the engine runs on.
///
/// The firmware family is answered by `vcgencmd` (or the configured
/// replacement); CPU, memory and uptime come from `/proc`; disk usage from
/// `df -Pk /`; per-process CPU usage from the `sysinfo` process table.
pub struct LocalProbes {
    firmware_cmd: String,
    cooling_device: PathBuf,
    command_timeout: Duration,
    prev_cpu: Option<CpuCounters>,
    /// Cached hostname (doesn't change at runtime).
    cached_hostname: Option<String>,
    system: System,
}

impl LocalProbes {
    pub fn new(firmware_cmd: impl Into<String>, cooling_device: impl Into<PathBuf>) -> Self {
        Self {
            firmware_cmd: firmware_cmd.into(),
            cooling_device: cooling_device.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            prev_cpu: None,
            cached_hostname: None,
            system: System::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.firmware_cmd.clone(),
            config.cooling_device_path.clone(),
        )
        .with_command_timeout(config.command_timeout())
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    fn query_firmware(&self, args: &[&str]) -> Result<String, ProbeError> {
        run_command(&self.firmware_cmd, args, self.command_timeout)
    }

    fn hostname(&mut self) -> Result<String, ProbeError> {
        if let Some(ref h) = self.cached_hostname {
            return Ok(h.clone());
        }
        let h = run_command("hostname", &[], self.command_timeout)?
            .trim()
            .to_string();
        if h.is_empty() {
            return Err(ProbeError::Parse("empty hostname".into()));
        }
        self.cached_hostname = Some(h.clone());
        Ok(h)
    }
}

impl ProbeSet for LocalProbes {
    fn firmware(&mut self) -> Result<FirmwareReading, ProbeError> {
        let temperature_c = parse_temp(&self.query_firmware(&["measure_temp"])?)?;
        let clock_mhz = parse_clock_mhz(&self.query_firmware(&["measure_clock", "arm"])?)?;
        let voltage_v = parse_volts(&self.query_firmware(&["measure_volts", "core"])?)?;
        let throttle_state = parse_throttled(&self.query_firmware(&["get_throttled"])?)?;
        Ok(FirmwareReading {
            temperature_c,
            clock_mhz,
            voltage_v,
            throttle_state,
        })
    }

    fn cooling_state(&mut self) -> Result<Option<u32>, ProbeError> {
        if !self.cooling_device.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.cooling_device)?;
        parse_cooling_state(&content).map(Some)
    }

    fn cpu_load_pct(&mut self) -> Result<f64, ProbeError> {
        let content = std::fs::read_to_string("/proc/stat")?;
        let line = content
            .lines()
            .find(|l| l.starts_with("cpu "))
            .ok_or_else(|| ProbeError::Parse("no aggregate cpu line in /proc/stat".into()))?;
        let counters = parse_cpu_line(line);
        let pct = match &self.prev_cpu {
            Some(prev) => cpu_percent_from_delta(prev, &counters),
            None => 0.0,
        };
        self.prev_cpu = Some(counters);
        Ok(pct)
    }

    fn memory(&mut self) -> Result<MemoryReading, ProbeError> {
        parse_meminfo(&std::fs::read_to_string("/proc/meminfo")?)
    }

    fn disk_used_pct(&mut self) -> Result<f64, ProbeError> {
        parse_df_output(&run_command("df", &["-Pk", "/"], self.command_timeout)?)
    }

    fn local_ip(&mut self) -> Result<String, ProbeError> {
        let host = self.hostname()?;
        let addrs = (host.as_str(), 0u16).to_socket_addrs()?;
        addrs
            .map(|a| a.ip())
            .find(IpAddr::is_ipv4)
            .map(|ip| ip.to_string())
            .ok_or_else(|| ProbeError::Unavailable(format!("no IPv4 address for {host}")))
    }

    fn uptime_s(&mut self) -> Result<f64, ProbeError> {
        parse_uptime(&std::fs::read_to_string("/proc/uptime")?)
    }

    fn processes(&mut self) -> Result<Vec<ProcessEntry>, ProbeError> {
        self.system.refresh_processes();
        let mut procs: Vec<_> = self.system.processes().iter().collect();
        // Stable order for processes with equal usage
        procs.sort_by_key(|(pid, _)| **pid);
        Ok(procs
            .into_iter()
            .map(|(_, p)| ProcessEntry {
                name: p.name().to_string(),
                cpu_pct: f64::from(p.cpu_usage()),
            })
            .collect())
    }
}

/// Run a command and capture its stdout, killing it after `timeout`.
fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<String, ProbeError> {
    let label = if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ProbeError::Command {
            command: label.clone(),
            reason: e.to_string(),
        })?;

    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            break;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            debug!("Killed '{label}' after {}ms", timeout.as_millis());
            return Err(ProbeError::Timeout(label));
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(ProbeError::Command {
            command: label,
            reason: format!("exited with status {}", output.status),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
