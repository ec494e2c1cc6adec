//! The service supervisor

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ServiceSpec, SupervisorConfig};

use super::{Health, HealthProbe, ManagedProcess, ServiceLauncher, ServiceState, SupervisorError};

/// Delay between health probes while waiting for a freshly spawned service
const STARTUP_PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// One service currently under supervision
struct RunningService {
    spec: ServiceSpec,
    process: Box<dyn ManagedProcess>,
    #[allow(dead_code)]
    started_at: DateTime<Utc>,
}

enum WaitOutcome {
    Healthy,
    TimedOut,
    Cancelled,
}

/// Starts and stops the service fleet in dependency order.
///
/// Startup is all-or-nothing: if any service fails to spawn or to become
/// healthy within the timeout, everything started so far is stopped in
/// strict reverse order and the error names the offender. Shutdown runs
/// exactly once no matter how many times it is requested.
pub struct ServiceSupervisor {
    config: SupervisorConfig,
    launcher: Arc<dyn ServiceLauncher>,
    probe: Arc<dyn HealthProbe>,
    /// Environment injected into every spawned service (credentials etc.)
    env: Vec<(String, String)>,
    running: Mutex<Vec<RunningService>>,
    states: Arc<RwLock<HashMap<String, ServiceState>>>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_started: AtomicBool,
    poll_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ServiceSupervisor {
    pub fn new(
        config: SupervisorConfig,
        launcher: Arc<dyn ServiceLauncher>,
        probe: Arc<dyn HealthProbe>,
        env: Vec<(String, String)>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(8);
        Self {
            config,
            launcher,
            probe,
            env,
            running: Mutex::new(Vec::new()),
            states: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx,
            shutdown_started: AtomicBool::new(false),
            poll_task: parking_lot::Mutex::new(None),
        }
    }

    fn grace(&self) -> Duration {
        Duration::from_secs(self.config.grace_period_secs)
    }

    fn set_state(&self, name: &str, state: ServiceState) {
        self.states.write().insert(name.to_string(), state);
    }

    /// Reject overlapping ports before anything is spawned
    fn check_ports(specs: &[ServiceSpec]) -> Result<(), SupervisorError> {
        let mut owners: HashMap<u16, &str> = HashMap::new();
        for spec in specs {
            if let Some(first) = owners.insert(spec.port, &spec.name) {
                return Err(SupervisorError::PortConflict {
                    port: spec.port,
                    first: first.to_string(),
                    second: spec.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Start every service, strictly in the given order, gating each on its
    /// first successful health probe. No partial start survives a failure.
    pub async fn start(&self, specs: &[ServiceSpec]) -> Result<(), SupervisorError> {
        Self::check_ports(specs)?;
        {
            let running = self.running.lock().await;
            for spec in specs {
                if let Some(existing) = running.iter().find(|r| r.spec.port == spec.port) {
                    return Err(SupervisorError::PortConflict {
                        port: spec.port,
                        first: existing.spec.name.clone(),
                        second: spec.name.clone(),
                    });
                }
            }
        }

        for spec in specs {
            if self.shutdown_started.load(Ordering::SeqCst) {
                self.rollback().await;
                return Err(SupervisorError::Cancelled);
            }

            info!(service = %spec.name, port = spec.port, "starting service");
            let process = match self.launcher.launch(spec, &self.env).await {
                Ok(p) => p,
                Err(e) => {
                    error!(service = %spec.name, error = %e, "spawn failed, rolling back");
                    self.rollback().await;
                    return Err(e);
                }
            };

            {
                let mut running = self.running.lock().await;
                if self.shutdown_started.load(Ordering::SeqCst) {
                    // Shutdown raced this spawn and may already have drained
                    // the list; the fresh process must not be orphaned.
                    let mut process = process;
                    process.terminate(self.grace()).await;
                    self.set_state(&spec.name, ServiceState::Stopped);
                    return Err(SupervisorError::Cancelled);
                }
                running.push(RunningService {
                    spec: spec.clone(),
                    process,
                    started_at: Utc::now(),
                });
            }
            self.set_state(&spec.name, ServiceState::Starting);

            match self.wait_until_healthy(spec).await {
                WaitOutcome::Healthy => {
                    self.set_state(&spec.name, ServiceState::Healthy);
                    info!(service = %spec.name, "service healthy");
                }
                WaitOutcome::Cancelled => {
                    self.rollback().await;
                    return Err(SupervisorError::Cancelled);
                }
                WaitOutcome::TimedOut => {
                    warn!(service = %spec.name, "startup health timeout, rolling back");
                    self.rollback().await;
                    return Err(SupervisorError::StartupTimeout {
                        service: spec.name.clone(),
                    });
                }
            }
        }

        self.spawn_poll_loop(specs.to_vec());
        info!(services = specs.len(), "all services healthy");
        Ok(())
    }

    async fn wait_until_healthy(&self, spec: &ServiceSpec) -> WaitOutcome {
        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(self.config.startup_timeout_secs);
        loop {
            if self.shutdown_started.load(Ordering::SeqCst) {
                return WaitOutcome::Cancelled;
            }
            if self.probe.probe(spec).await == Health::Healthy {
                return WaitOutcome::Healthy;
            }
            if tokio::time::Instant::now() >= deadline {
                return WaitOutcome::TimedOut;
            }
            tokio::time::sleep(STARTUP_PROBE_INTERVAL).await;
        }
    }

    /// Stop already-started services in reverse start order after a failed
    /// startup. Unlike [`shutdown_all`] this does not latch the shutdown
    /// flag: the operator may fix the problem and start again.
    ///
    /// [`shutdown_all`]: ServiceSupervisor::shutdown_all
    async fn rollback(&self) {
        let mut running = self.running.lock().await;
        while let Some(mut svc) = running.pop() {
            warn!(
                service = %svc.spec.name,
                pid = svc.process.pid(),
                "stopping service (startup rollback)"
            );
            svc.process.terminate(self.grace()).await;
            self.set_state(&svc.spec.name, ServiceState::Stopped);
        }
    }

    /// Non-blocking snapshot of every known service state.
    ///
    /// Reads only the cached results of the last poll; never fails, even
    /// while the fleet is degraded.
    pub fn status(&self) -> HashMap<String, ServiceState> {
        self.states.read().clone()
    }

    /// True only when at least one service is tracked and every one of
    /// them is Healthy
    pub fn all_healthy(&self) -> bool {
        let states = self.states.read();
        !states.is_empty() && states.values().all(|s| *s == ServiceState::Healthy)
    }

    /// Gracefully stop one service by name; a grace period precedes the
    /// forced kill. Stopping a service that is not running is a no-op.
    pub async fn stop(&self, name: &str) {
        let mut running = self.running.lock().await;
        match running.iter().position(|r| r.spec.name == name) {
            Some(pos) => {
                let mut svc = running.remove(pos);
                info!(service = %name, pid = svc.process.pid(), "stopping service");
                svc.process.terminate(self.grace()).await;
                self.set_state(name, ServiceState::Stopped);
            }
            None => {
                debug!(service = %name, "stop requested for service that is not running");
            }
        }
    }

    /// Stop everything in reverse start order, best effort, exactly once.
    ///
    /// Repeated calls (e.g. a second interrupt) return immediately.
    /// Returns the names of the services stopped by this call, in stop
    /// order.
    pub async fn shutdown_all(&self) -> Vec<String> {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            debug!("shutdown already in progress");
            return Vec::new();
        }

        info!("shutting down all services");
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.poll_task.lock().take() {
            handle.abort();
        }

        let mut stopped = Vec::new();
        let mut running = self.running.lock().await;
        while let Some(mut svc) = running.pop() {
            info!(service = %svc.spec.name, pid = svc.process.pid(), "stopping service");
            svc.process.terminate(self.grace()).await;
            self.set_state(&svc.spec.name, ServiceState::Stopped);
            stopped.push(svc.spec.name.clone());
        }
        info!(stopped = stopped.len(), "shutdown complete");
        stopped
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_started.load(Ordering::SeqCst)
    }

    /// Background loop refreshing the status cache. Unreachable probes are
    /// logged apart from plain unhealthy answers but land in the same
    /// state. Stopped services are left alone.
    fn spawn_poll_loop(&self, specs: Vec<ServiceSpec>) {
        let probe = self.probe.clone();
        let states = self.states.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_secs(self.config.poll_interval_secs);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; services were just gated
            // healthy, so skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for spec in &specs {
                            let previous = states.read().get(&spec.name).copied();
                            if matches!(previous, Some(ServiceState::Stopped) | None) {
                                continue;
                            }

                            let health = probe.probe(spec).await;
                            let next = match health {
                                Health::Healthy => ServiceState::Healthy,
                                Health::Unhealthy => ServiceState::Unhealthy,
                                Health::Unreachable => {
                                    warn!(service = %spec.name, "service unreachable");
                                    ServiceState::Unhealthy
                                }
                            };

                            let mut states = states.write();
                            match states.get(&spec.name) {
                                // A concurrent stop wins over a stale probe
                                Some(ServiceState::Stopped) | None => {}
                                Some(prev) => {
                                    if *prev != next {
                                        warn!(service = %spec.name, from = %prev, to = %next, "health transition");
                                    }
                                    states.insert(spec.name.clone(), next);
                                }
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        let mut slot = self.poll_task.lock();
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_services;

    #[test]
    fn check_ports_accepts_disjoint_fleet() {
        assert!(ServiceSupervisor::check_ports(&default_services()).is_ok());
    }

    #[test]
    fn check_ports_names_both_claimants() {
        let mut specs = default_services();
        specs[2].port = specs[0].port;
        let err = ServiceSupervisor::check_ports(&specs).unwrap_err();
        match err {
            SupervisorError::PortConflict { port, first, second } => {
                assert_eq!(port, 8002);
                assert_eq!(first, "summarizer");
                assert_eq!(second, "similarity");
            }
            other => panic!("expected PortConflict, got {other:?}"),
        }
    }
}
