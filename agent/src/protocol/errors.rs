//! Standard and application JSON-RPC 2.0 error codes.

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i64 = -32600;

/// The method does not exist / is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;

// Application error codes (PiMark-specific).

/// Protocol version mismatch.
pub const VERSION_NOT_SUPPORTED: i64 = -32002;

/// Invalid engine configuration values.
pub const INVALID_CONFIGURATION: i64 = -32005;

/// The agent has not been initialized yet (must call `initialize` first).
pub const NOT_INITIALIZED: i64 = -32007;

/// The stress workload could not be launched.
pub const STRESS_LAUNCH_FAILED: i64 = -32020;

/// The engine task has stopped.
pub const ENGINE_UNAVAILABLE: i64 = -32021;

/// The requested series metric does not exist.
pub const UNKNOWN_METRIC: i64 = -32022;
