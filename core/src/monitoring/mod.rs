//! Telemetry collection: probes, parsers and the snapshot sampler.

pub mod local;
pub mod parser;
pub mod probe;
pub mod sampler;
pub mod types;

pub use local::LocalProbes;
pub use probe::ProbeSet;
pub use sampler::Sampler;
pub use types::{
    CpuCounters, FirmwareReading, MemoryReading, ProcessEntry, Snapshot, ThrottleState,
    FALLBACK_IP,
};
