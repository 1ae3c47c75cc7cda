//! Launching and terminating the stress workload process.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::errors::StressError;

/// How a running workload ended after a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Exited on its own after SIGTERM (or had already exited).
    Exited,
    /// Ignored the grace period and was killed.
    Killed,
}

/// A running stress workload.
///
/// Dropping the handle must release the workload, so a panicking or aborted
/// engine task never leaves it running.
#[async_trait::async_trait]
pub trait StressProcess: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Ask the workload to exit, waiting up to `grace` before killing it.
    async fn terminate(&mut self, grace: Duration) -> Result<TerminateOutcome, StressError>;
}

/// Spawns stress workloads.
pub trait StressLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn StressProcess>, StressError>;
}

/// Launches the configured command line (`stress_cmd`).
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    argv: Vec<String>,
}

impl CommandLauncher {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

impl StressLauncher for CommandLauncher {
    fn launch(&self) -> Result<Box<dyn StressProcess>, StressError> {
        let (program, args) = self.argv.split_first().ok_or(StressError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(StressError::EmptyCommand);
        }

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        // Own process group, so signals also reach anything the workload forks
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| StressError::LaunchFailed {
            command: self.command_line(),
            source,
        })?;

        info!(
            "Launched stress workload '{}' (pid {:?})",
            self.command_line(),
            child.id()
        );
        Ok(Box::new(ChildProcess::new(child)))
    }
}

/// A workload spawned by [`CommandLauncher`].
///
/// On Unix the workload leads its own process group and every signal goes
/// to the whole group.
struct ChildProcess {
    child: Child,
    /// Group id while members may still be alive.
    #[cfg(unix)]
    group: Option<nix::unistd::Pid>,
}

impl ChildProcess {
    fn new(child: Child) -> Self {
        Self {
            #[cfg(unix)]
            group: child
                .id()
                .map(|pid| nix::unistd::Pid::from_raw(pid as i32)),
            child,
        }
    }

    /// Send SIGTERM to the group on Unix; elsewhere fall through to a kill.
    fn request_exit(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.signal_group(nix::sys::signal::Signal::SIGTERM)
        }
        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    /// Kill every remaining member and reap the leader.
    async fn force_kill(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            self.signal_group(nix::sys::signal::Signal::SIGKILL)?;
            self.group = None;
            self.child.wait().await?;
            Ok(())
        }
        #[cfg(not(unix))]
        {
            self.child.kill().await
        }
    }

    /// Kill members that outlived the leader.
    fn sweep_group(&mut self) {
        #[cfg(unix)]
        {
            if let Err(e) = self.signal_group(nix::sys::signal::Signal::SIGKILL) {
                debug!("Sweeping stress process group failed: {e}");
            }
            self.group = None;
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) -> std::io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;

        let Some(group) = self.group else {
            return Ok(());
        };
        match killpg(group, signal) {
            // No member left
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(std::io::Error::from(e)),
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            if let Err(e) = self.signal_group(nix::sys::signal::Signal::SIGKILL) {
                warn!("Killing stress process group on drop failed: {e}");
            }
        }
    }
}

#[async_trait::async_trait]
impl StressProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self, grace: Duration) -> Result<TerminateOutcome, StressError> {
        let pid = self.child.id();
        if pid.is_none() {
            // Already reaped
            self.sweep_group();
            return Ok(TerminateOutcome::Exited);
        }

        if let Err(e) = self.request_exit() {
            debug!("SIGTERM to stress workload {pid:?} failed: {e}");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                debug!("Stress workload {pid:?} exited: {:?}", status?);
                self.sweep_group();
                Ok(TerminateOutcome::Exited)
            }
            Err(_) => {
                let timeout = StressError::TerminateTimeout {
                    pid,
                    grace_ms: grace.as_millis() as u64,
                };
                warn!("{timeout}; killing it");
                self.force_kill().await?;
                Ok(TerminateOutcome::Killed)
            }
        }
    }
}
