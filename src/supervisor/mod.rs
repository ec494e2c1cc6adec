//! Service supervision
//!
//! Starts, health-gates, monitors, and tears down the fixed fleet of
//! analysis services, plus the once-per-day processing scheduler. The
//! supervisor never restarts an unhealthy service on its own; restart is an
//! explicit operator stop+start.

mod health;
mod process;
mod scheduler;
#[allow(clippy::module_inception)]
mod supervisor;

pub use health::{Health, HealthProbe, HttpHealthChecker};
pub use process::{ManagedProcess, ProcessLauncher, ServiceLauncher};
pub use scheduler::{DailyJob, Scheduler};
pub use supervisor::ServiceSupervisor;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors fatal to supervisor operations
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// Two specs claim the same port, or the port is already supervised
    #[error("port {port} claimed by both '{first}' and '{second}'")]
    PortConflict {
        port: u16,
        first: String,
        second: String,
    },

    /// The service executable could not be spawned
    #[error("failed to spawn service '{service}'")]
    SpawnFailure {
        service: String,
        #[source]
        source: std::io::Error,
    },

    /// The service never became healthy within the startup timeout
    #[error("service '{service}' did not become healthy before the startup timeout")]
    StartupTimeout { service: String },

    /// Startup was interrupted by shutdown
    #[error("startup cancelled by shutdown")]
    Cancelled,
}

/// Lifecycle state of a supervised service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Spawned, first successful health probe still pending
    Starting,
    Healthy,
    /// A later probe failed or was unreachable; never auto-restarted
    Unhealthy,
    Stopped,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
