//! Error types for the PiMark engine.
//!
//! Probe failures never leave the sampler: they are folded into the
//! snapshot's unknown values. Stress-workload failures surface through the
//! engine facade; everything else is wrapped in [`CoreError`].

use thiserror::Error;

/// Top-level error type for configuration and engine start-up.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A configuration error (invalid values, inconsistent periods).
    #[error("Config error: {0}")]
    Config(String),
}

/// A single probe could not produce a value.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The external command could not be executed or exited unsuccessfully.
    #[error("Command failed: {command}: {reason}")]
    Command { command: String, reason: String },

    /// The external command did not finish within its time budget.
    #[error("Command timed out: {0}")]
    Timeout(String),

    /// The probe output did not have the expected shape.
    #[error("Unexpected probe output: {0}")]
    Parse(String),

    /// The probe is not available on this host.
    #[error("Probe unavailable: {0}")]
    Unavailable(String),

    /// A low-level I/O error while reading a sensor file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the stress-workload lifecycle.
#[derive(Error, Debug)]
pub enum StressError {
    /// The configured stress command has no program.
    #[error("Stress command is empty")]
    EmptyCommand,

    /// The stress workload could not be spawned.
    #[error("Failed to launch stress workload '{command}': {source}")]
    LaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The workload ignored the termination request; it was killed instead.
    #[error("Stress workload (pid {pid:?}) did not exit within {grace_ms} ms")]
    TerminateTimeout { pid: Option<u32>, grace_ms: u64 },

    /// Signalling or reaping the workload failed.
    #[error("Failed to terminate stress workload: {0}")]
    Terminate(#[from] std::io::Error),
}

/// Errors returned by the engine facade.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine task is no longer running.
    #[error("Engine is not running")]
    Stopped,

    /// Starting or stopping the stress workload failed.
    #[error("Stress error: {0}")]
    Stress(#[from] StressError),
}
