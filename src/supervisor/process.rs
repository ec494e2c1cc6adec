//! Spawned service processes
//!
//! [`ServiceLauncher`] and [`ManagedProcess`] are the seams between the
//! supervisor's ordering logic and the operating system; tests swap in
//! recording fakes, production uses tokio child processes.

use super::SupervisorError;
use crate::config::ServiceSpec;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// A spawned service process under supervisor control
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    /// OS process id (0 if the platform could not report one)
    fn pid(&self) -> u32;

    /// Request graceful termination; escalate to a forced kill once the
    /// grace period passes. A refusal to die is logged, never an error —
    /// shutdown always proceeds.
    async fn terminate(&mut self, grace: Duration);
}

/// Spawns service processes from their specs
#[async_trait]
pub trait ServiceLauncher: Send + Sync {
    async fn launch(
        &self,
        spec: &ServiceSpec,
        env: &[(String, String)],
    ) -> Result<Box<dyn ManagedProcess>, SupervisorError>;
}

/// Production launcher using tokio child processes.
///
/// Credentials and the assigned port travel through the child environment;
/// `kill_on_drop` backstops against orphans if the supervisor itself dies.
pub struct ProcessLauncher;

#[async_trait]
impl ServiceLauncher for ProcessLauncher {
    async fn launch(
        &self,
        spec: &ServiceSpec,
        env: &[(String, String)],
    ) -> Result<Box<dyn ManagedProcess>, SupervisorError> {
        let child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(env.iter().cloned())
            .env("SERVICE_PORT", spec.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailure {
                service: spec.name.clone(),
                source: e,
            })?;

        let pid = child.id().unwrap_or(0);
        debug!(service = %spec.name, pid, port = spec.port, "spawned service");

        Ok(Box::new(ChildProcess {
            name: spec.name.clone(),
            pid,
            child,
        }))
    }
}

/// A real child process
struct ChildProcess {
    name: String,
    pid: u32,
    child: Child,
}

impl ChildProcess {
    #[cfg(unix)]
    fn send_sigterm(&self) {
        // kill(2) with SIGTERM; failure just means the process is gone
        unsafe {
            libc::kill(self.pid as i32, libc::SIGTERM);
        }
    }

    #[cfg(not(unix))]
    fn send_sigterm(&self) {}
}

#[async_trait]
impl ManagedProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn terminate(&mut self, grace: Duration) {
        self.send_sigterm();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(service = %self.name, pid = self.pid, %status, "service exited");
            }
            Ok(Err(e)) => {
                warn!(service = %self.name, pid = self.pid, error = %e, "wait on service failed");
            }
            Err(_) => {
                warn!(
                    service = %self.name,
                    pid = self.pid,
                    "service did not exit within grace period, killing"
                );
                if let Err(e) = self.child.kill().await {
                    warn!(service = %self.name, pid = self.pid, error = %e, "kill failed");
                }
            }
        }
    }
}
