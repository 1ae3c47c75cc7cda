//! Idle/Running state machine around the stress workload.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::errors::StressError;
use crate::stress::process::{StressLauncher, StressProcess, TerminateOutcome};

/// Whether a test runs until stopped or for a fixed benchmark interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestMode {
    Untimed,
    Timed,
}

/// Why a test ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StopReason {
    /// Requested by the user (or by shutdown).
    Manual,
    /// A timed benchmark reached its duration.
    Expired,
    /// The thermal cutoff was exceeded.
    Safety,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Manual => "MANUAL",
            Self::Expired => "EXPIRED",
            Self::Safety => "SAFETY",
        })
    }
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A test was already running; the request was ignored.
    AlreadyRunning,
}

/// Bookkeeping for the running test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestSession {
    pub mode: TestMode,
    pub started_at: Instant,
    /// Benchmark length; `None` for untimed tests.
    pub duration: Option<Duration>,
}

impl TestSession {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// A timed session whose duration has fully elapsed.
    pub fn is_expired(&self) -> bool {
        self.duration.is_some_and(|d| self.elapsed() >= d)
    }
}

struct ActiveSession {
    session: TestSession,
    process: Box<dyn StressProcess>,
}

/// Owns at most one running stress workload.
///
/// A session exists exactly while a workload is running.
pub struct StressController {
    launcher: Box<dyn StressLauncher>,
    grace: Duration,
    benchmark_duration: Duration,
    active: Option<ActiveSession>,
}

impl StressController {
    pub fn new(
        launcher: Box<dyn StressLauncher>,
        grace: Duration,
        benchmark_duration: Duration,
    ) -> Self {
        Self {
            launcher,
            grace,
            benchmark_duration,
            active: None,
        }
    }

    /// Launch the workload and open a session.
    ///
    /// On launch failure the controller stays idle.
    pub fn start(&mut self, mode: TestMode) -> Result<StartOutcome, StressError> {
        if self.active.is_some() {
            debug!("Start requested while a test is running; ignoring");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let process = self.launcher.launch()?;
        let session = TestSession {
            mode,
            started_at: Instant::now(),
            duration: match mode {
                TestMode::Timed => Some(self.benchmark_duration),
                TestMode::Untimed => None,
            },
        };
        info!("Test started: mode={mode:?} pid={:?}", process.id());
        self.active = Some(ActiveSession { session, process });
        Ok(StartOutcome::Started)
    }

    /// Terminate the workload and close the session.
    ///
    /// Returns the closed session, or `None` when idle.
    pub async fn stop(&mut self, reason: StopReason) -> Option<TestSession> {
        let ActiveSession {
            session,
            mut process,
        } = self.active.take()?;

        match process.terminate(self.grace).await {
            Ok(TerminateOutcome::Exited) => {}
            Ok(TerminateOutcome::Killed) => debug!("Stress workload needed a forced kill"),
            Err(e) => error!("Failed to terminate stress workload: {e}"),
        }
        info!(
            "Test stopped: reason={reason} after {:.1}s",
            session.elapsed().as_secs_f64()
        );
        Some(session)
    }

    pub fn session(&self) -> Option<&TestSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }
}
