//! The engine task and its facade.
//!
//! One tokio task owns the sampler, the stress controller and the benchmark
//! aggregator. It runs a single fast ticker; every `slow_tick / fast_tick`-th
//! tick is also a slow tick. UI commands arrive over an mpsc channel so that
//! test transitions are ordered with snapshot publication. Everything the UI
//! may read lives in a mutex-protected [`SharedState`] that is only locked
//! for short copies, never across a probe call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bench::{BenchStats, Summary};
use crate::config::EngineConfig;
use crate::errors::{CoreError, EngineError, StressError};
use crate::monitoring::{LocalProbes, ProbeSet, Sampler, Snapshot};
use crate::safety;
use crate::series::{Metric, TimeSeries};
use crate::stress::{
    CommandLauncher, StartOutcome, StopReason, StressController, StressLauncher, TestMode,
    TestSession,
};

/// Capacity of the command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Requests sent from the facade to the engine task.
pub enum EngineCommand {
    StartTest {
        timed: bool,
        reply: oneshot::Sender<Result<StartOutcome, StressError>>,
    },
    StopTest {
        reason: StopReason,
        reply: oneshot::Sender<bool>,
    },
}

/// Values published by the engine task for readers.
struct PublishedState {
    latest: Snapshot,
    series: TimeSeries,
    /// Single-slot mailbox for the last benchmark result.
    summary: Option<Summary>,
    session: Option<TestSession>,
    last_stop: Option<StopReason>,
    last_error: Option<String>,
}

/// Read side of the published state.
#[derive(Clone)]
pub struct SharedState {
    inner: Arc<Mutex<PublishedState>>,
}

impl SharedState {
    fn new(config: &EngineConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PublishedState {
                latest: Snapshot::default(),
                series: TimeSeries::new(config.series_cap, config.time_step_s()),
                summary: None,
                session: None,
                last_stop: None,
                last_error: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PublishedState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recent slow-tick snapshot (all unknown before the first one).
    pub fn latest(&self) -> Snapshot {
        self.lock().latest.clone()
    }

    pub fn series(&self, metric: Metric) -> (Vec<f64>, Vec<f64>) {
        self.lock().series.view(metric)
    }

    /// Consume the pending benchmark summary, if any.
    pub fn take_summary(&self) -> Option<Summary> {
        self.lock().summary.take()
    }

    pub fn is_running(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn session(&self) -> Option<TestSession> {
        self.lock().session
    }

    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.lock().last_stop
    }

    /// Consume the last launch error, if any.
    pub fn take_last_error(&self) -> Option<String> {
        self.lock().last_error.take()
    }
}

/// State owned by the engine task.
pub struct Engine {
    config: EngineConfig,
    stress: StressController,
    bench: Option<BenchStats>,
    shared: SharedState,
}

impl Engine {
    pub fn new(config: EngineConfig, launcher: Box<dyn StressLauncher>) -> Self {
        let stress = StressController::new(
            launcher,
            config.stop_grace(),
            config.benchmark_duration(),
        );
        let shared = SharedState::new(&config);
        Self {
            config,
            stress,
            bench: None,
            shared,
        }
    }

    pub fn shared(&self) -> SharedState {
        self.shared.clone()
    }

    /// Validate the configuration and spawn the engine task.
    pub fn spawn<P: ProbeSet + 'static>(
        config: EngineConfig,
        probes: P,
        launcher: Box<dyn StressLauncher>,
    ) -> Result<EngineHandle, CoreError> {
        config.validate()?;

        let sampler = Sampler::new(probes, config.top_process_count);
        let engine = Engine::new(config, launcher);
        let shared = engine.shared();
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(engine.run(sampler, rx, cancel.clone()));

        Ok(EngineHandle {
            inner: Arc::new(HandleInner {
                shared,
                commands: tx,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        })
    }

    /// Spawn an engine reading the local board and running `stress_cmd`.
    pub fn spawn_local(config: EngineConfig) -> Result<EngineHandle, CoreError> {
        let probes = LocalProbes::from_config(&config);
        let launcher = CommandLauncher::new(config.stress_cmd.clone());
        Self::spawn(config, probes, Box::new(launcher))
    }

    /// Main loop. Returns after cancellation or when every handle is gone.
    pub async fn run<P: ProbeSet + 'static>(
        mut self,
        sampler: Sampler<P>,
        mut commands: mpsc::Receiver<EngineCommand>,
        cancel: CancellationToken,
    ) {
        let sampler = Arc::new(Mutex::new(sampler));
        let slow_every = self.config.slow_every();
        let mut ticker = tokio::time::interval(self.config.fast_tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick: u64 = 0;

        info!(
            "Engine started (fast tick {}ms, slow tick {}ms)",
            self.config.fast_tick_ms, self.config.slow_tick_ms
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Engine cancelled");
                    break;
                }
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            debug!("All engine handles dropped");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    let slow = tick % slow_every == 0;
                    tick += 1;
                    let snapshot = fetch(&sampler, slow, self.config.fetch_budget()).await;
                    if slow {
                        self.on_slow_tick(snapshot.clone()).await;
                    }
                    self.on_fast_tick(snapshot).await;
                }
            }
        }

        self.stop_test(StopReason::Manual).await;
        info!("Engine stopped");
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::StartTest { timed, reply } => {
                let result = self.start_test(timed);
                let _ = reply.send(result);
            }
            EngineCommand::StopTest { reason, reply } => {
                let stopped = self.stop_test(reason).await;
                let _ = reply.send(stopped);
            }
        }
    }

    /// Handle a slow-cadence snapshot; `None` means the fetch was skipped.
    pub async fn on_slow_tick(&mut self, snapshot: Option<Snapshot>) {
        if let Some(snapshot) = snapshot {
            if let Some(bench) = self.bench.as_mut() {
                bench.accept(&snapshot);
            }
            self.shared.lock().latest = snapshot.clone();

            if self.check_safety(&snapshot).await {
                return;
            }
        }

        let expired = self.stress.session().is_some_and(TestSession::is_expired);
        if expired {
            self.stop_test(StopReason::Expired).await;
        }
    }

    /// Handle a fast-cadence snapshot; `None` means the fetch was skipped.
    pub async fn on_fast_tick(&mut self, snapshot: Option<Snapshot>) {
        match snapshot {
            Some(snapshot) => {
                self.shared.lock().series.push(&snapshot);
                self.check_safety(&snapshot).await;
            }
            None => self.shared.lock().series.skip(),
        }
    }

    /// Stop the test if the snapshot exceeds the cutoff. Returns whether it did.
    async fn check_safety(&mut self, snapshot: &Snapshot) -> bool {
        let cutoff = self.config.thermal_cutoff_c;
        if !safety::should_trip(snapshot, self.stress.is_running(), cutoff) {
            return false;
        }
        warn!(
            "Temperature {:.1}°C above cutoff {:.1}°C, stopping test",
            snapshot.temperature_c, cutoff
        );
        self.stop_test(StopReason::Safety).await
    }

    /// Start a test; a timed test resets the aggregator.
    pub fn start_test(&mut self, timed: bool) -> Result<StartOutcome, StressError> {
        let mode = if timed {
            TestMode::Timed
        } else {
            TestMode::Untimed
        };

        match self.stress.start(mode) {
            Ok(StartOutcome::Started) => {
                self.bench = timed.then(BenchStats::new);
                self.shared.lock().session = self.stress.session().copied();
                Ok(StartOutcome::Started)
            }
            Ok(StartOutcome::AlreadyRunning) => Ok(StartOutcome::AlreadyRunning),
            Err(e) => {
                error!("Could not start test: {e}");
                self.shared.lock().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop the running test, if any. Returns whether a test was stopped.
    ///
    /// Only an expired timed test publishes a summary.
    pub async fn stop_test(&mut self, reason: StopReason) -> bool {
        let Some(session) = self.stress.stop(reason).await else {
            return false;
        };
        let bench = self.bench.take();

        let mut state = self.shared.lock();
        if reason == StopReason::Expired && session.mode == TestMode::Timed {
            if let Some(bench) = bench {
                let summary = bench.summary();
                info!(
                    "Benchmark complete after {} samples: max {:.1}°C, rating {}",
                    bench.samples, summary.max_temp_c, summary.rating
                );
                state.summary = Some(summary);
            }
        }
        state.session = None;
        state.last_stop = Some(reason);
        true
    }
}

/// Fetch a snapshot on the blocking pool, bounded by `budget`.
///
/// Returns `None` on overrun, or when an earlier overrunning fetch still
/// holds the sampler.
async fn fetch<P: ProbeSet + 'static>(
    sampler: &Arc<Mutex<Sampler<P>>>,
    full: bool,
    budget: std::time::Duration,
) -> Option<Snapshot> {
    let sampler = sampler.clone();
    let task = tokio::task::spawn_blocking(move || {
        let mut sampler = match sampler.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(if full {
            sampler.fetch()
        } else {
            sampler.fetch_fast()
        })
    });

    match tokio::time::timeout(budget, task).await {
        Ok(Ok(Some(snapshot))) => Some(snapshot),
        Ok(Ok(None)) => {
            debug!("Previous fetch still running, skipping tick");
            None
        }
        Ok(Err(e)) => {
            error!("Fetch task failed: {e}");
            None
        }
        Err(_) => {
            warn!("Fetch exceeded {}ms budget, skipping tick", budget.as_millis());
            None
        }
    }
}

struct HandleInner {
    shared: SharedState,
    commands: mpsc::Sender<EngineCommand>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable facade over a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<HandleInner>,
}

impl EngineHandle {
    pub fn latest(&self) -> Snapshot {
        self.inner.shared.latest()
    }

    pub fn series(&self, metric: Metric) -> (Vec<f64>, Vec<f64>) {
        self.inner.shared.series(metric)
    }

    pub async fn start_test(&self, timed: bool) -> Result<StartOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .commands
            .send(EngineCommand::StartTest { timed, reply })
            .await
            .map_err(|_| EngineError::Stopped)?;
        Ok(rx.await.map_err(|_| EngineError::Stopped)??)
    }

    /// Stop the running test. Stopping while idle succeeds and returns `false`.
    pub async fn stop_test(&self, reason: StopReason) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .commands
            .send(EngineCommand::StopTest { reason, reply })
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    pub fn take_summary(&self) -> Option<Summary> {
        self.inner.shared.take_summary()
    }

    pub fn is_running(&self) -> bool {
        self.inner.shared.is_running()
    }

    /// Whole seconds since the running test started; 0 when idle.
    pub fn session_elapsed_s(&self) -> u64 {
        self.inner
            .shared
            .session()
            .map_or(0, |s| s.elapsed().as_secs())
    }

    pub fn session_mode(&self) -> Option<TestMode> {
        self.inner.shared.session().map(|s| s.mode)
    }

    pub fn session(&self) -> Option<TestSession> {
        self.inner.shared.session()
    }

    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.inner.shared.last_stop_reason()
    }

    pub fn take_last_error(&self) -> Option<String> {
        self.inner.shared.take_last_error()
    }

    /// Cancel the engine task and wait for it to stop the running test.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Engine task failed: {e}");
            }
        }
    }
}
