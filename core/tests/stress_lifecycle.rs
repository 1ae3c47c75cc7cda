//! Stress workload lifecycle tests (SL-01 through SL-07).
//!
//! Run a real `sleep` process as the stress workload and check that it is
//! terminated on stop, on safety trips and on engine shutdown. SL-05 onwards
//! use a shell that forks `sleep`, so the whole process group must go.

#![cfg(unix)]

mod common;

use std::time::{Duration, Instant};

use common::FixedProbes;
use pimark_core::config::EngineConfig;
use pimark_core::engine::Engine;
use pimark_core::stress::{
    CommandLauncher, StartOutcome, StopReason, StressLauncher, TerminateOutcome,
};

fn sleep_config(marker: &str) -> EngineConfig {
    EngineConfig {
        fast_tick_ms: 20,
        slow_tick_ms: 100,
        stress_cmd: vec!["sleep".into(), marker.into()],
        ..Default::default()
    }
}

fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Wait up to two seconds for every process with this argv to disappear.
#[cfg(target_os = "linux")]
async fn gone_within_two_seconds(argv: &[&str]) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while common::process_with_argv_exists(argv) {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    true
}

/// Wait for the forked grandchild to show up.
#[cfg(target_os = "linux")]
async fn wait_for_process(argv: &[&str]) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !common::process_with_argv_exists(argv) {
        assert!(Instant::now() < deadline, "{argv:?} never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[cfg(target_os = "linux")]
fn forking_launcher(script: &str) -> CommandLauncher {
    CommandLauncher::new(vec!["sh".into(), "-c".into(), script.into()])
}

// ── SL-01: terminate reaps the workload ─────────────────────────────

#[tokio::test]
async fn sl_01_terminate_reaps_workload() {
    let launcher = CommandLauncher::new(vec!["sleep".into(), "30".into()]);
    let mut process = launcher.launch().expect("sleep should launch");
    let pid = process.id().expect("running process has a pid");
    assert!(pid_alive(pid));

    let started = Instant::now();
    let outcome = process.terminate(Duration::from_secs(2)).await.unwrap();
    assert_eq!(outcome, TerminateOutcome::Exited);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!pid_alive(pid));
}

// ── SL-02: dropping the handle kills the workload ───────────────────

#[tokio::test]
async fn sl_02_drop_kills_workload() {
    let launcher = CommandLauncher::new(vec!["sleep".into(), "30".into()]);
    let process = launcher.launch().expect("sleep should launch");
    let pid = process.id().expect("running process has a pid");
    drop(process);

    let deadline = Instant::now() + Duration::from_secs(2);
    while std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .map(|stat| !stat.contains(") Z "))
        .unwrap_or(false)
    {
        assert!(Instant::now() < deadline, "workload survived drop");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ── SL-03: shutdown leaves no workload behind ───────────────────────

#[cfg(target_os = "linux")]
#[tokio::test]
async fn sl_03_shutdown_terminates_workload() {
    let marker = "31.4159";
    let handle = Engine::spawn(
        sleep_config(marker),
        FixedProbes::default(),
        Box::new(CommandLauncher::new(vec!["sleep".into(), marker.into()])),
    )
    .unwrap();

    assert_eq!(handle.start_test(false).await.unwrap(), StartOutcome::Started);
    assert!(common::process_with_argv_exists(&["sleep", marker]));

    let started = Instant::now();
    handle.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!common::process_with_argv_exists(&["sleep", marker]));
}

// ── SL-04: safety trip stops the real workload ──────────────────────

#[cfg(target_os = "linux")]
#[tokio::test]
async fn sl_04_safety_trip_terminates_workload() {
    let marker = "27.1828";
    let config = sleep_config(marker);
    let launcher = CommandLauncher::new(config.stress_cmd.clone());
    let handle = Engine::spawn(
        config,
        FixedProbes {
            temperature_c: 91.0,
        },
        Box::new(launcher),
    )
    .unwrap();

    handle.start_test(true).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(!handle.is_running());
    assert_eq!(handle.last_stop_reason(), Some(StopReason::Safety));
    assert!(handle.take_summary().is_none());
    assert!(!common::process_with_argv_exists(&["sleep", marker]));

    handle.shutdown().await;
}

// ── SL-05: terminate reaches forked children ────────────────────────

#[cfg(target_os = "linux")]
#[tokio::test]
async fn sl_05_terminate_reaches_forked_children() {
    let marker = "91.25";
    let mut process = forking_launcher(&format!("sleep {marker}; true"))
        .launch()
        .expect("sh should launch");
    wait_for_process(&["sleep", marker]).await;

    let outcome = process.terminate(Duration::from_secs(2)).await.unwrap();
    assert_eq!(outcome, TerminateOutcome::Exited);
    assert!(gone_within_two_seconds(&["sleep", marker]).await);
}

// ── SL-06: shutdown kills a group that ignores SIGTERM ──────────────

#[cfg(target_os = "linux")]
#[tokio::test]
async fn sl_06_shutdown_kills_stubborn_process_group() {
    let marker = "92.5";
    let script = format!("trap '' TERM; sleep {marker}; true");
    let config = EngineConfig {
        stop_grace_ms: 300,
        stress_cmd: vec!["sh".into(), "-c".into(), script.clone()],
        ..sleep_config(marker)
    };
    let handle = Engine::spawn(
        config,
        FixedProbes::default(),
        Box::new(forking_launcher(&script)),
    )
    .unwrap();

    assert_eq!(handle.start_test(false).await.unwrap(), StartOutcome::Started);
    wait_for_process(&["sleep", marker]).await;

    handle.shutdown().await;
    assert!(!handle.is_running());
    assert!(gone_within_two_seconds(&["sleep", marker]).await);
}

// ── SL-07: dropping the handle kills forked children ────────────────

#[cfg(target_os = "linux")]
#[tokio::test]
async fn sl_07_drop_kills_forked_children() {
    let marker = "93.75";
    let process = forking_launcher(&format!("sleep {marker}; true"))
        .launch()
        .expect("sh should launch");
    wait_for_process(&["sleep", marker]).await;

    drop(process);
    assert!(gone_within_two_seconds(&["sleep", marker]).await);
}
