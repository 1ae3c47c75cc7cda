use std::time::Instant;

use chrono::{DateTime, Utc};
use pimark_core::config::EngineConfig;
use pimark_core::engine::{Engine, EngineHandle};
use pimark_core::errors::{CoreError, EngineError};
use pimark_core::series::Metric;
use pimark_core::stress::{StartOutcome, StopReason};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::protocol::errors;
use crate::protocol::messages::{JsonRpcErrorResponse, JsonRpcRequest, JsonRpcResponse};
use crate::protocol::methods::{
    Capabilities, HealthCheckResult, InitializeParams, InitializeResult, SeriesParams,
    SeriesResult, TakeSummaryResult, TestStartParams, TestStartResult, TestStatusResult,
};

/// The agent's protocol version.
const AGENT_PROTOCOL_VERSION: &str = "0.1.0";

/// Builds the engine once the client has sent its configuration.
pub type EngineFactory = Box<dyn Fn(EngineConfig) -> Result<EngineHandle, CoreError> + Send>;

/// Dispatcher handles incoming JSON-RPC requests and routes them
/// to the engine facade.
pub struct Dispatcher {
    factory: EngineFactory,
    engine: Option<EngineHandle>,
    config: EngineConfig,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

/// The result of dispatching a request: either a success or error response.
pub enum DispatchResult {
    Success(JsonRpcResponse),
    Error(JsonRpcErrorResponse),
}

impl DispatchResult {
    /// Serialize the result to a JSON `Value`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Success(resp) => serde_json::to_value(resp).unwrap_or_default(),
            Self::Error(resp) => serde_json::to_value(resp).unwrap_or_default(),
        }
    }
}

fn success<T: Serialize>(id: Value, result: &T) -> DispatchResult {
    match serde_json::to_value(result) {
        Ok(value) => DispatchResult::Success(JsonRpcResponse::new(id, value)),
        Err(e) => failure(id, errors::INTERNAL_ERROR, format!("Serialization failed: {e}")),
    }
}

fn failure(id: Value, code: i64, message: impl Into<String>) -> DispatchResult {
    DispatchResult::Error(JsonRpcErrorResponse::new(id, code, message))
}

fn engine_failure(id: Value, err: EngineError) -> DispatchResult {
    match err {
        EngineError::Stopped => failure(id, errors::ENGINE_UNAVAILABLE, err.to_string()),
        EngineError::Stress(e) => failure(id, errors::STRESS_LAUNCH_FAILED, e.to_string()),
    }
}

impl Dispatcher {
    /// Dispatcher that drives the local board.
    pub fn local() -> Self {
        Self::new(Box::new(Engine::spawn_local))
    }

    pub fn new(factory: EngineFactory) -> Self {
        Self {
            factory,
            engine: None,
            config: EngineConfig::default(),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Dispatch a parsed JSON-RPC request to the appropriate handler.
    pub async fn dispatch(&mut self, request: JsonRpcRequest) -> DispatchResult {
        let method = request.method.as_str();

        debug!("Dispatching method: {}", method);

        // The `initialize` method is always allowed
        if method == "initialize" {
            return self.handle_initialize(request);
        }

        // All other methods require a running engine
        let Some(engine) = self.engine.clone() else {
            return failure(
                request.id,
                errors::NOT_INITIALIZED,
                "Agent not initialized, call 'initialize' first",
            );
        };

        match method {
            "engine.latest" => success(request.id, &engine.latest()),
            "engine.series" => Self::handle_series(&engine, request),
            "test.start" => Self::handle_test_start(&engine, request).await,
            "test.stop" => Self::handle_test_stop(&engine, request).await,
            "test.status" => Self::handle_test_status(&engine, request),
            "test.take_summary" => Self::handle_take_summary(&engine, request),
            "health.check" => self.handle_health_check(&engine, request),
            _ => {
                warn!("Unknown method: {}", method);
                failure(
                    request.id,
                    errors::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                )
            }
        }
    }

    /// Stop the engine (and any running test).
    pub async fn shutdown(&mut self) {
        if let Some(engine) = self.engine.take() {
            info!("Shutting down engine");
            engine.shutdown().await;
        }
    }

    fn handle_initialize(&mut self, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id;

        let params: InitializeParams = match serde_json::from_value(request.params) {
            Ok(p) => p,
            Err(e) => {
                return failure(
                    id,
                    errors::INVALID_PARAMS,
                    format!("Invalid initialize params: {e}"),
                );
            }
        };

        // Version negotiation: we only support major version 0
        let major = params
            .protocol_version
            .split('.')
            .next()
            .and_then(|s| s.parse::<u32>().ok());

        if major != Some(0) {
            return failure(
                id,
                errors::VERSION_NOT_SUPPORTED,
                format!(
                    "Unsupported protocol version: {} (agent supports 0.x)",
                    params.protocol_version
                ),
            );
        }

        if self.engine.is_some() {
            debug!("Repeated initialize from {}; keeping running engine", params.client);
        } else {
            let config = params.config.unwrap_or_default();
            match (self.factory)(config.clone()) {
                Ok(engine) => {
                    info!(
                        "Engine started for {} {}",
                        params.client, params.client_version
                    );
                    self.engine = Some(engine);
                    self.config = config;
                }
                Err(CoreError::Config(msg)) => {
                    return failure(id, errors::INVALID_CONFIGURATION, msg);
                }
            }
        }

        let result = InitializeResult {
            protocol_version: AGENT_PROTOCOL_VERSION.to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: Capabilities {
                metrics: Metric::ALL.iter().map(|m| m.as_str().to_string()).collect(),
                benchmark_duration_s: self.config.benchmark_duration_s,
                thermal_cutoff_c: self.config.thermal_cutoff_c,
                series_cap: self.config.series_cap,
            },
        };
        success(id, &result)
    }

    fn handle_series(engine: &EngineHandle, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id;

        let params: SeriesParams = match serde_json::from_value(request.params) {
            Ok(p) => p,
            Err(e) => {
                return failure(
                    id,
                    errors::INVALID_PARAMS,
                    format!("Invalid engine.series params: {e}"),
                );
            }
        };

        let metric: Metric = match params.metric.parse() {
            Ok(m) => m,
            Err(msg) => {
                return DispatchResult::Error(
                    JsonRpcErrorResponse::new(id, errors::UNKNOWN_METRIC, msg)
                        .with_data(json!({"metric": params.metric})),
                );
            }
        };

        let (xs, ys) = engine.series(metric);
        success(
            id,
            &SeriesResult {
                metric: metric.as_str().to_string(),
                xs,
                ys,
            },
        )
    }

    async fn handle_test_start(engine: &EngineHandle, request: JsonRpcRequest) -> DispatchResult {
        let id = request.id;

        // Missing params mean an untimed test
        let params = if request.params.is_null() {
            TestStartParams { timed: false }
        } else {
            match serde_json::from_value(request.params) {
                Ok(p) => p,
                Err(e) => {
                    return failure(
                        id,
                        errors::INVALID_PARAMS,
                        format!("Invalid test.start params: {e}"),
                    );
                }
            }
        };

        match engine.start_test(params.timed).await {
            Ok(outcome) => {
                let status = match outcome {
                    StartOutcome::Started => "started",
                    StartOutcome::AlreadyRunning => "already_running",
                };
                success(
                    id,
                    &TestStartResult {
                        status: status.to_string(),
                    },
                )
            }
            Err(e) => engine_failure(id, e),
        }
    }

    async fn handle_test_stop(engine: &EngineHandle, request: JsonRpcRequest) -> DispatchResult {
        match engine.stop_test(StopReason::Manual).await {
            Ok(_) => DispatchResult::Success(JsonRpcResponse::new(request.id, json!({}))),
            Err(e) => engine_failure(request.id, e),
        }
    }

    fn handle_test_status(engine: &EngineHandle, request: JsonRpcRequest) -> DispatchResult {
        let session = engine.session();
        let result = TestStatusResult {
            running: session.is_some(),
            mode: session.map(|s| s.mode),
            elapsed_s: engine.session_elapsed_s(),
            duration_s: session.and_then(|s| s.duration).map(|d| d.as_secs()),
            last_stop_reason: engine.last_stop_reason(),
            last_error: engine.take_last_error(),
        };
        success(request.id, &result)
    }

    fn handle_take_summary(engine: &EngineHandle, request: JsonRpcRequest) -> DispatchResult {
        let summary = engine.take_summary();
        let report = summary.as_ref().map(ToString::to_string);
        success(request.id, &TakeSummaryResult { summary, report })
    }

    fn handle_health_check(&self, engine: &EngineHandle, request: JsonRpcRequest) -> DispatchResult {
        let result = HealthCheckResult {
            status: "ok".to_string(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            started_at: self.started_at.to_rfc3339(),
            test_running: engine.is_running(),
        };
        success(request.id, &result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use pimark_core::errors::{ProbeError, StressError};
    use pimark_core::monitoring::{
        FirmwareReading, MemoryReading, ProbeSet, ProcessEntry, ThrottleState,
    };
    use pimark_core::stress::{StressLauncher, StressProcess, TerminateOutcome};

    struct FixedProbes;

    impl ProbeSet for FixedProbes {
        fn firmware(&mut self) -> Result<FirmwareReading, ProbeError> {
            Ok(FirmwareReading {
                temperature_c: 55.5,
                clock_mhz: 1800,
                voltage_v: 0.85,
                throttle_state: ThrottleState::Ok,
            })
        }
        fn cooling_state(&mut self) -> Result<Option<u32>, ProbeError> {
            Ok(Some(1))
        }
        fn cpu_load_pct(&mut self) -> Result<f64, ProbeError> {
            Ok(25.0)
        }
        fn memory(&mut self) -> Result<MemoryReading, ProbeError> {
            Ok(MemoryReading {
                used_bytes: 300 * 1_048_576,
                total_bytes: 2048 * 1_048_576,
            })
        }
        fn disk_used_pct(&mut self) -> Result<f64, ProbeError> {
            Ok(20.0)
        }
        fn local_ip(&mut self) -> Result<String, ProbeError> {
            Ok("10.1.2.3".into())
        }
        fn uptime_s(&mut self) -> Result<f64, ProbeError> {
            Ok(42.0)
        }
        fn processes(&mut self) -> Result<Vec<ProcessEntry>, ProbeError> {
            Ok(vec![ProcessEntry {
                name: "stress-ng".into(),
                cpu_pct: 99.0,
            }])
        }
    }

    #[derive(Clone, Default)]
    struct CountingLauncher {
        fail: bool,
        terminated: Arc<AtomicUsize>,
    }

    struct IdleProcess {
        terminated: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl StressProcess for IdleProcess {
        fn id(&self) -> Option<u32> {
            None
        }
        async fn terminate(&mut self, _grace: Duration) -> Result<TerminateOutcome, StressError> {
            self.terminated.fetch_add(1, Ordering::SeqCst);
            Ok(TerminateOutcome::Exited)
        }
    }

    impl StressLauncher for CountingLauncher {
        fn launch(&self) -> Result<Box<dyn StressProcess>, StressError> {
            if self.fail {
                return Err(StressError::LaunchFailed {
                    command: "stress-ng --cpu 0".into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                });
            }
            Ok(Box::new(IdleProcess {
                terminated: self.terminated.clone(),
            }))
        }
    }

    fn make_dispatcher_with(launcher: CountingLauncher) -> Dispatcher {
        Dispatcher::new(Box::new(move |config: EngineConfig| {
            Engine::spawn(config, FixedProbes, Box::new(launcher.clone()))
        }))
    }

    fn make_dispatcher() -> Dispatcher {
        make_dispatcher_with(CountingLauncher::default())
    }

    fn make_request(method: &str, params: Value, id: u64) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: json!(id),
        }
    }

    fn init_params() -> Value {
        json!({
            "protocol_version": "0.1.0",
            "client": "test",
            "client_version": "0.1.0",
            "config": {"fast_tick_ms": 10, "slow_tick_ms": 50}
        })
    }

    async fn init_dispatcher(d: &mut Dispatcher) {
        let req = make_request("initialize", init_params(), 1);
        let result = d.dispatch(req).await;
        assert!(matches!(result, DispatchResult::Success(_)));
    }

    async fn call(d: &mut Dispatcher, method: &str, params: Value) -> Value {
        d.dispatch(make_request(method, params, 7)).await.to_json()
    }

    // ── Initialize tests ────────────────────────────────────────────

    #[tokio::test]
    async fn initialize_succeeds() {
        let mut d = make_dispatcher();
        let json = call(&mut d, "initialize", init_params()).await;
        assert_eq!(json["result"]["protocol_version"], "0.1.0");
        assert_eq!(json["result"]["capabilities"]["benchmark_duration_s"], 300);
        assert!(json["result"]["capabilities"]["metrics"]
            .as_array()
            .unwrap()
            .contains(&json!("temp")));
        d.shutdown().await;
    }

    #[tokio::test]
    async fn initialize_rejects_incompatible_version() {
        let mut d = make_dispatcher();
        let json = call(
            &mut d,
            "initialize",
            json!({
                "protocol_version": "1.0.0",
                "client": "test",
                "client_version": "1.0.0"
            }),
        )
        .await;
        assert_eq!(json["error"]["code"], errors::VERSION_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn initialize_rejects_invalid_params() {
        let mut d = make_dispatcher();
        let json = call(&mut d, "initialize", json!({"bad": true})).await;
        assert_eq!(json["error"]["code"], errors::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn initialize_rejects_invalid_config() {
        let mut d = make_dispatcher();
        let json = call(
            &mut d,
            "initialize",
            json!({
                "protocol_version": "0.1.0",
                "client": "test",
                "client_version": "0.1.0",
                "config": {"fast_tick_ms": 300, "slow_tick_ms": 1000}
            }),
        )
        .await;
        assert_eq!(json["error"]["code"], errors::INVALID_CONFIGURATION);

        // Still not initialized
        let json = call(&mut d, "engine.latest", Value::Null).await;
        assert_eq!(json["error"]["code"], errors::NOT_INITIALIZED);
    }

    #[tokio::test]
    async fn methods_require_initialization() {
        let mut d = make_dispatcher();
        for method in ["engine.latest", "test.start", "health.check"] {
            let json = call(&mut d, method, Value::Null).await;
            assert_eq!(json["error"]["code"], errors::NOT_INITIALIZED);
        }
    }

    #[tokio::test]
    async fn unknown_method_returns_error() {
        let mut d = make_dispatcher();
        init_dispatcher(&mut d).await;
        let json = call(&mut d, "session.create", json!({})).await;
        assert_eq!(json["error"]["code"], errors::METHOD_NOT_FOUND);
        d.shutdown().await;
    }

    // ── Engine tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn latest_and_series_report_samples() {
        let mut d = make_dispatcher();
        init_dispatcher(&mut d).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let json = call(&mut d, "engine.latest", Value::Null).await;
        assert_eq!(json["result"]["clock_mhz"], 1800);
        assert_eq!(json["result"]["ip_address"], "10.1.2.3");
        assert_eq!(json["result"]["fan_pct"], 25);
        assert_eq!(json["result"]["top_processes"][0]["name"], "stress-ng");

        let json = call(&mut d, "engine.series", json!({"metric": "temp"})).await;
        assert_eq!(json["result"]["metric"], "temp");
        let xs = json["result"]["xs"].as_array().unwrap();
        let ys = json["result"]["ys"].as_array().unwrap();
        assert!(!xs.is_empty());
        assert_eq!(xs.len(), ys.len());
        assert_eq!(ys[0], 55.5);

        d.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_metric_is_rejected() {
        let mut d = make_dispatcher();
        init_dispatcher(&mut d).await;
        let json = call(&mut d, "engine.series", json!({"metric": "fan"})).await;
        assert_eq!(json["error"]["code"], errors::UNKNOWN_METRIC);
        assert_eq!(json["error"]["data"]["metric"], "fan");

        let json = call(&mut d, "engine.series", Value::Null).await;
        assert_eq!(json["error"]["code"], errors::INVALID_PARAMS);
        d.shutdown().await;
    }

    // ── Test lifecycle tests ────────────────────────────────────────

    #[tokio::test]
    async fn start_status_stop_cycle() {
        let launcher = CountingLauncher::default();
        let terminated = launcher.terminated.clone();
        let mut d = make_dispatcher_with(launcher);
        init_dispatcher(&mut d).await;

        let json = call(&mut d, "test.start", json!({"timed": true})).await;
        assert_eq!(json["result"]["status"], "started");

        let json = call(&mut d, "test.start", json!({"timed": false})).await;
        assert_eq!(json["result"]["status"], "already_running");

        let json = call(&mut d, "test.status", Value::Null).await;
        assert_eq!(json["result"]["running"], true);
        assert_eq!(json["result"]["mode"], "TIMED");
        assert_eq!(json["result"]["duration_s"], 300);

        let json = call(&mut d, "test.stop", Value::Null).await;
        assert_eq!(json["result"], json!({}));
        assert_eq!(terminated.load(Ordering::SeqCst), 1);

        let json = call(&mut d, "test.status", Value::Null).await;
        assert_eq!(json["result"]["running"], false);
        assert_eq!(json["result"]["last_stop_reason"], "MANUAL");
        assert!(json["result"]["mode"].is_null());

        // Manual stop never produces a summary
        let json = call(&mut d, "test.take_summary", Value::Null).await;
        assert!(json["result"]["summary"].is_null());

        // Stopping again is a no-op
        let json = call(&mut d, "test.stop", Value::Null).await;
        assert_eq!(json["result"], json!({}));

        d.shutdown().await;
    }

    #[tokio::test]
    async fn start_without_params_is_untimed() {
        let mut d = make_dispatcher();
        init_dispatcher(&mut d).await;
        let json = call(&mut d, "test.start", Value::Null).await;
        assert_eq!(json["result"]["status"], "started");
        let json = call(&mut d, "test.status", Value::Null).await;
        assert_eq!(json["result"]["mode"], "UNTIMED");
        assert!(json["result"]["duration_s"].is_null());
        d.shutdown().await;
    }

    #[tokio::test]
    async fn launch_failure_is_reported() {
        let mut d = make_dispatcher_with(CountingLauncher {
            fail: true,
            ..Default::default()
        });
        init_dispatcher(&mut d).await;

        let json = call(&mut d, "test.start", json!({"timed": true})).await;
        assert_eq!(json["error"]["code"], errors::STRESS_LAUNCH_FAILED);

        let json = call(&mut d, "test.status", Value::Null).await;
        assert_eq!(json["result"]["running"], false);
        assert!(json["result"]["last_error"]
            .as_str()
            .unwrap()
            .contains("stress-ng"));

        // The error flag is one-shot
        let json = call(&mut d, "test.status", Value::Null).await;
        assert!(json["result"]["last_error"].is_null());
        d.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_running_test() {
        let launcher = CountingLauncher::default();
        let terminated = launcher.terminated.clone();
        let mut d = make_dispatcher_with(launcher);
        init_dispatcher(&mut d).await;
        call(&mut d, "test.start", json!({"timed": false})).await;

        d.shutdown().await;
        assert_eq!(terminated.load(Ordering::SeqCst), 1);
    }

    // ── Health check tests ──────────────────────────────────────────

    #[tokio::test]
    async fn health_check_returns_ok() {
        let mut d = make_dispatcher();
        init_dispatcher(&mut d).await;
        let json = call(&mut d, "health.check", Value::Null).await;
        assert_eq!(json["result"]["status"], "ok");
        assert_eq!(json["result"]["test_running"], false);
        assert!(json["result"]["started_at"].is_string());
        d.shutdown().await;
    }
}
