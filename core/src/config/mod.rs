use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Engine configuration.
///
/// Every field has a default, so a partial JSON object (or `{}`) is a valid
/// configuration.
/// - `fast_tick_ms`/`slow_tick_ms`: sampling cadences; the slow tick must be
///   a whole multiple of the fast tick.
/// - `series_cap`: ring-buffer capacity per graphed metric.
/// - `stress_cmd`: argv of the stress workload (program first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_fast_tick_ms")]
    pub fast_tick_ms: u64,
    #[serde(default = "default_slow_tick_ms")]
    pub slow_tick_ms: u64,
    #[serde(default = "default_series_cap")]
    pub series_cap: usize,
    #[serde(default = "default_benchmark_duration_s")]
    pub benchmark_duration_s: u64,
    #[serde(default = "default_thermal_cutoff_c")]
    pub thermal_cutoff_c: f64,
    #[serde(default = "default_stress_cmd")]
    pub stress_cmd: Vec<String>,
    #[serde(default = "default_fetch_budget_ms")]
    pub fetch_budget_ms: u64,
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    #[serde(default = "default_top_process_count")]
    pub top_process_count: usize,
    #[serde(default = "default_firmware_cmd")]
    pub firmware_cmd: String,
    #[serde(default = "default_cooling_device_path")]
    pub cooling_device_path: PathBuf,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fast_tick_ms: default_fast_tick_ms(),
            slow_tick_ms: default_slow_tick_ms(),
            series_cap: default_series_cap(),
            benchmark_duration_s: default_benchmark_duration_s(),
            thermal_cutoff_c: default_thermal_cutoff_c(),
            stress_cmd: default_stress_cmd(),
            fetch_budget_ms: default_fetch_budget_ms(),
            stop_grace_ms: default_stop_grace_ms(),
            top_process_count: default_top_process_count(),
            firmware_cmd: default_firmware_cmd(),
            cooling_device_path: default_cooling_device_path(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Check that the values are usable together.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.fast_tick_ms == 0 || self.slow_tick_ms == 0 {
            return Err(CoreError::Config("tick periods must be non-zero".into()));
        }
        if self.slow_tick_ms % self.fast_tick_ms != 0 {
            return Err(CoreError::Config(format!(
                "slow_tick_ms ({}) must be a multiple of fast_tick_ms ({})",
                self.slow_tick_ms, self.fast_tick_ms
            )));
        }
        if self.series_cap == 0 {
            return Err(CoreError::Config("series_cap must be non-zero".into()));
        }
        if self.benchmark_duration_s == 0 {
            return Err(CoreError::Config(
                "benchmark_duration_s must be non-zero".into(),
            ));
        }
        if !self.thermal_cutoff_c.is_finite() {
            return Err(CoreError::Config("thermal_cutoff_c must be finite".into()));
        }
        if self.stress_cmd.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(CoreError::Config("stress_cmd must name a program".into()));
        }
        if self.fetch_budget_ms == 0 {
            return Err(CoreError::Config("fetch_budget_ms must be non-zero".into()));
        }
        if self.command_timeout_ms == 0 {
            return Err(CoreError::Config(
                "command_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn fast_tick(&self) -> Duration {
        Duration::from_millis(self.fast_tick_ms)
    }

    pub fn fetch_budget(&self) -> Duration {
        Duration::from_millis(self.fetch_budget_ms)
    }

    /// Upper bound for one external probe command.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn benchmark_duration(&self) -> Duration {
        Duration::from_secs(self.benchmark_duration_s)
    }

    /// Number of fast ticks per slow tick.
    pub fn slow_every(&self) -> u64 {
        (self.slow_tick_ms / self.fast_tick_ms.max(1)).max(1)
    }

    /// Series X-axis step in seconds.
    pub fn time_step_s(&self) -> f64 {
        self.fast_tick_ms as f64 / 1000.0
    }
}

fn default_fast_tick_ms() -> u64 {
    100
}

fn default_slow_tick_ms() -> u64 {
    1000
}

fn default_series_cap() -> usize {
    150
}

fn default_benchmark_duration_s() -> u64 {
    300
}

fn default_thermal_cutoff_c() -> f64 {
    85.0
}

fn default_stress_cmd() -> Vec<String> {
    ["stress-ng", "--cpu", "0", "--matrix-size", "128"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_fetch_budget_ms() -> u64 {
    500
}

fn default_stop_grace_ms() -> u64 {
    2000
}

fn default_top_process_count() -> usize {
    5
}

fn default_firmware_cmd() -> String {
    "vcgencmd".to_string()
}

fn default_cooling_device_path() -> PathBuf {
    PathBuf::from("/sys/class/thermal/cooling_device0/cur_state")
}

fn default_command_timeout_ms() -> u64 {
    200
}
