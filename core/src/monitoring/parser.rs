//! Parsers for firmware query output, `/proc` files and `df`.
//!
//! All functions are pure so they can be exercised without the board
//! firmware or a Linux host.

use crate::errors::ProbeError;
use crate::monitoring::types::{CpuCounters, MemoryReading, ProcessEntry, ThrottleState};

/// Maximum length of a process name in the live process monitor.
pub const PROCESS_NAME_LEN: usize = 12;

/// Percentage points contributed by each cooling-device step.
const FAN_PCT_PER_STEP: u32 = 25;

const BYTES_PER_MIB: u64 = 1_048_576;

/// Return the value after `key=` on the first matching line.
fn field_value<'a>(output: &'a str, key: &str) -> Result<&'a str, ProbeError> {
    output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or_else(|| ProbeError::Parse(format!("missing '{key}=' in {:?}", output.trim())))
}

/// Parse `measure_temp` output: `temp=48.3'C`.
pub fn parse_temp(output: &str) -> Result<f64, ProbeError> {
    let value = field_value(output, "temp")?;
    let value = value.trim_end_matches("'C").trim();
    value
        .parse()
        .map_err(|_| ProbeError::Parse(format!("invalid temperature: {value:?}")))
}

/// Parse `measure_clock arm` output: `frequency(48)=1500398464` (Hz) into MHz.
pub fn parse_clock_mhz(output: &str) -> Result<u32, ProbeError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("frequency"))
        .ok_or_else(|| ProbeError::Parse(format!("missing frequency in {:?}", output.trim())))?;
    let hz: u64 = line
        .split('=')
        .nth(1)
        .map(str::trim)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProbeError::Parse(format!("invalid frequency line: {line:?}")))?;
    Ok((hz / 1_000_000) as u32)
}

/// Parse `measure_volts core` output: `volt=0.8500V`.
pub fn parse_volts(output: &str) -> Result<f64, ProbeError> {
    let value = field_value(output, "volt")?;
    let value = value.trim_end_matches('V').trim();
    value
        .parse()
        .map_err(|_| ProbeError::Parse(format!("invalid voltage: {value:?}")))
}

/// Parse `get_throttled` output: `throttled=0x50005`. Any non-zero bit is throttling.
pub fn parse_throttled(output: &str) -> Result<ThrottleState, ProbeError> {
    let value = field_value(output, "throttled")?.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    let word = u32::from_str_radix(digits, 16)
        .map_err(|_| ProbeError::Parse(format!("invalid throttle word: {value:?}")))?;
    Ok(if word == 0 {
        ThrottleState::Ok
    } else {
        ThrottleState::Throttled
    })
}

/// Parse the integer in a cooling-device `cur_state` file.
pub fn parse_cooling_state(content: &str) -> Result<u32, ProbeError> {
    let value = content.trim();
    value
        .parse()
        .map_err(|_| ProbeError::Parse(format!("invalid cooling state: {value:?}")))
}

/// Convert a cooling-device step into a fan percentage, clamped to 100.
pub fn fan_pct_from_state(state: u32) -> u8 {
    state.saturating_mul(FAN_PCT_PER_STEP).min(100) as u8
}

/// Compute CPU usage percentage from the delta between two counter snapshots.
/// Returns a value between 0.0 and 100.0.
pub fn cpu_percent_from_delta(prev: &CpuCounters, curr: &CpuCounters) -> f64 {
    let total_delta = curr.total().saturating_sub(prev.total());
    if total_delta == 0 {
        return 0.0;
    }
    let idle_delta = curr.idle_total().saturating_sub(prev.idle_total());
    let active_delta = total_delta.saturating_sub(idle_delta);
    (active_delta as f64 / total_delta as f64) * 100.0
}

/// Parse the aggregate `cpu` line from `/proc/stat`.
///
/// Format: `cpu  user nice system idle iowait irq softirq steal [guest guest_nice]`
pub fn parse_cpu_line(line: &str) -> CpuCounters {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let field = |i: usize| parts.get(i).and_then(|s| s.parse().ok()).unwrap_or(0);
    CpuCounters {
        user: field(1),
        nice: field(2),
        system: field(3),
        idle: field(4),
        iowait: field(5),
        irq: field(6),
        softirq: field(7),
        steal: field(8),
    }
}

/// Extract the numeric kB value from a `/proc/meminfo` line like
/// `"MemTotal:       16384000 kB"`.
pub fn parse_meminfo_value(line: &str) -> u64 {
    line.split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Parse `/proc/meminfo` into used/total bytes (used = total - available).
pub fn parse_meminfo(content: &str) -> Result<MemoryReading, ProbeError> {
    let mut total_kb: Option<u64> = None;
    let mut available_kb: Option<u64> = None;
    for line in content.lines() {
        if line.starts_with("MemTotal:") {
            total_kb = Some(parse_meminfo_value(line));
        } else if line.starts_with("MemAvailable:") {
            available_kb = Some(parse_meminfo_value(line));
        }
    }
    let total_kb = total_kb.ok_or_else(|| ProbeError::Parse("MemTotal missing".into()))?;
    let available_kb = available_kb.unwrap_or(total_kb);
    Ok(MemoryReading {
        used_bytes: total_kb.saturating_sub(available_kb) * 1024,
        total_bytes: total_kb * 1024,
    })
}

/// Bytes to whole MiB, truncated.
pub fn bytes_to_mib(bytes: u64) -> u64 {
    bytes / BYTES_PER_MIB
}

/// Parse the first value of `/proc/uptime` (seconds since boot).
pub fn parse_uptime(content: &str) -> Result<f64, ProbeError> {
    content
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProbeError::Parse(format!("invalid uptime: {:?}", content.trim())))
}

/// Parse `df -Pk /` output and return the used percentage of the filesystem.
pub fn parse_df_output(output: &str) -> Result<f64, ProbeError> {
    for line in output.lines() {
        if line.starts_with("Filesystem") || line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 5 {
            // parts[4] is like "42%"
            return parts[4]
                .trim_end_matches('%')
                .parse()
                .map_err(|_| ProbeError::Parse(format!("invalid capacity: {:?}", parts[4])));
        }
    }
    Err(ProbeError::Parse("no filesystem line in df output".into()))
}

/// Clamp a percentage into 0..=100 and round it to an integer.
pub fn whole_percent(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

/// Select the `n` busiest processes, descending by CPU usage.
///
/// Names are cut to [`PROCESS_NAME_LEN`] characters. The sort is stable,
/// so processes with equal usage keep their input order.
pub fn top_processes(mut entries: Vec<ProcessEntry>, n: usize) -> Vec<ProcessEntry> {
    entries.sort_by(|a, b| b.cpu_pct.total_cmp(&a.cpu_pct));
    entries.truncate(n);
    for entry in &mut entries {
        if entry.name.chars().count() > PROCESS_NAME_LEN {
            entry.name = entry.name.chars().take(PROCESS_NAME_LEN).collect();
        }
    }
    entries
}
