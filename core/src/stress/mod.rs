//! Stress-workload lifecycle.

pub mod controller;
pub mod process;

pub use controller::{StartOutcome, StopReason, StressController, TestMode, TestSession};
pub use process::{CommandLauncher, StressLauncher, StressProcess, TerminateOutcome};
