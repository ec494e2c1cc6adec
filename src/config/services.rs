//! Service fleet, supervisor, and scheduler configuration

use serde::{Deserialize, Serialize};

fn default_health_path() -> String {
    "/health".to_string()
}

/// One backend service managed by the supervisor.
///
/// Order of appearance in the config is startup order; shutdown runs in
/// reverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Unique service name
    pub name: String,
    /// Executable to spawn
    pub command: String,
    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
    /// Port the service listens on (also its identity for conflict checks)
    pub port: u16,
    /// Liveness endpoint path
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl ServiceSpec {
    /// Liveness URL probed by the health checker
    pub fn health_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.port, self.health_path)
    }
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_poll_interval() -> u64 {
    10
}

fn default_grace_period() -> u64 {
    5
}

/// Supervisor timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Seconds to wait for a freshly spawned service to become healthy
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
    /// Per-probe HTTP timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Interval between background health polls in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Grace period before a terminate escalates to a kill, in seconds
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            startup_timeout_secs: default_startup_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            poll_interval_secs: default_poll_interval(),
            grace_period_secs: default_grace_period(),
        }
    }
}

fn default_time_of_day() -> String {
    "00:00".to_string()
}

fn default_tick_interval() -> u64 {
    30
}

/// Daily processing scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Wall-clock time the daily job fires at, "HH:MM" local time
    #[serde(default = "default_time_of_day")]
    pub time_of_day: String,
    /// Scheduler tick granularity in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_of_day: default_time_of_day(),
            tick_interval_secs: default_tick_interval(),
        }
    }
}

/// Default service fleet: the three analysis services first, then the data
/// processing API that fans out to them.
pub fn default_services() -> Vec<ServiceSpec> {
    vec![
        ServiceSpec {
            name: "summarizer".to_string(),
            command: "modqueue-summarizer".to_string(),
            args: Vec::new(),
            port: 8002,
            health_path: default_health_path(),
        },
        ServiceSpec {
            name: "rule-violation".to_string(),
            command: "modqueue-rule-violation".to_string(),
            args: Vec::new(),
            port: 8003,
            health_path: default_health_path(),
        },
        ServiceSpec {
            name: "similarity".to_string(),
            command: "modqueue-similarity".to_string(),
            args: Vec::new(),
            port: 8004,
            health_path: default_health_path(),
        },
        ServiceSpec {
            name: "data-api".to_string(),
            command: "modqueue-data-api".to_string(),
            args: Vec::new(),
            port: 8001,
            health_path: default_health_path(),
        },
    ]
}
