use serde::{Deserialize, Serialize};

use pimark_core::bench::Summary;
use pimark_core::config::EngineConfig;
use pimark_core::stress::{StopReason, TestMode};

// ── initialize ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeParams {
    pub protocol_version: String,
    pub client: String,
    pub client_version: String,
    /// Engine overrides; omitted fields keep their defaults.
    #[serde(default)]
    pub config: Option<EngineConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub metrics: Vec<String>,
    pub benchmark_duration_s: u64,
    pub thermal_cutoff_c: f64,
    pub series_cap: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub agent_version: String,
    pub capabilities: Capabilities,
}

// ── engine.series ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesParams {
    pub metric: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesResult {
    pub metric: String,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

// ── test.start ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TestStartParams {
    #[serde(default)]
    pub timed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestStartResult {
    pub status: String,
}

// ── test.status ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TestStatusResult {
    pub running: bool,
    pub mode: Option<TestMode>,
    pub elapsed_s: u64,
    pub duration_s: Option<u64>,
    pub last_stop_reason: Option<StopReason>,
    /// One-shot: reported once, then cleared.
    pub last_error: Option<String>,
}

// ── test.take_summary ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TakeSummaryResult {
    pub summary: Option<Summary>,
    /// Plain-text results report, present with a summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

// ── health.check ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub status: String,
    pub uptime_secs: u64,
    pub started_at: String,
    pub test_running: bool,
}
