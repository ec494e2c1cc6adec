//! Fleet lifecycle tests with recording fakes in place of real processes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use modqueue::config::{ServiceSpec, SupervisorConfig};
use modqueue::supervisor::{
    Health, HealthProbe, ManagedProcess, ServiceLauncher, ServiceState, ServiceSupervisor,
    SupervisorError,
};

/// Chronological record of spawn/stop events, shared with every fake
type EventLog = Arc<Mutex<Vec<String>>>;

struct FakeProcess {
    name: String,
    log: EventLog,
}

#[async_trait]
impl ManagedProcess for FakeProcess {
    fn pid(&self) -> u32 {
        1
    }

    async fn terminate(&mut self, _grace: Duration) {
        self.log.lock().push(format!("stop:{}", self.name));
    }
}

struct FakeLauncher {
    log: EventLog,
    /// Services whose spawn fails outright
    fail_spawn: Vec<String>,
}

impl FakeLauncher {
    fn new(log: EventLog) -> Self {
        Self {
            log,
            fail_spawn: Vec::new(),
        }
    }
}

#[async_trait]
impl ServiceLauncher for FakeLauncher {
    async fn launch(
        &self,
        spec: &ServiceSpec,
        _env: &[(String, String)],
    ) -> Result<Box<dyn ManagedProcess>, SupervisorError> {
        if self.fail_spawn.contains(&spec.name) {
            return Err(SupervisorError::SpawnFailure {
                service: spec.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such binary"),
            });
        }
        self.log.lock().push(format!("spawn:{}", spec.name));
        Ok(Box::new(FakeProcess {
            name: spec.name.clone(),
            log: self.log.clone(),
        }))
    }
}

/// Probe answering from a fixed per-service table; unknown names are
/// unreachable
struct ScriptedProbe {
    answers: HashMap<String, Health>,
}

impl ScriptedProbe {
    fn healthy_for(names: &[&str]) -> Self {
        Self {
            answers: names
                .iter()
                .map(|n| (n.to_string(), Health::Healthy))
                .collect(),
        }
    }

    fn set(mut self, name: &str, health: Health) -> Self {
        self.answers.insert(name.to_string(), health);
        self
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, spec: &ServiceSpec) -> Health {
        *self.answers.get(&spec.name).unwrap_or(&Health::Unreachable)
    }
}

fn spec(name: &str, port: u16) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        command: format!("modqueue-{name}"),
        args: Vec::new(),
        port,
        health_path: "/health".to_string(),
    }
}

fn fleet() -> Vec<ServiceSpec> {
    vec![
        spec("summarizer", 8002),
        spec("rule-violation", 8003),
        spec("similarity", 8004),
        spec("data-api", 8001),
    ]
}

/// Short timeouts so failure paths resolve quickly
fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        startup_timeout_secs: 1,
        probe_timeout_secs: 1,
        poll_interval_secs: 3600,
        grace_period_secs: 1,
    }
}

fn supervisor(
    launcher: FakeLauncher,
    probe: ScriptedProbe,
) -> ServiceSupervisor {
    ServiceSupervisor::new(
        test_config(),
        Arc::new(launcher),
        Arc::new(probe),
        Vec::new(),
    )
}

#[tokio::test]
async fn healthy_fleet_starts_in_order() {
    let log: EventLog = Default::default();
    let probe = ScriptedProbe::healthy_for(&["summarizer", "rule-violation", "similarity", "data-api"]);
    let sup = supervisor(FakeLauncher::new(log.clone()), probe);

    sup.start(&fleet()).await.unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "spawn:summarizer",
            "spawn:rule-violation",
            "spawn:similarity",
            "spawn:data-api",
        ]
    );
    assert!(sup.all_healthy());
    for state in sup.status().values() {
        assert_eq!(*state, ServiceState::Healthy);
    }
}

#[tokio::test]
async fn unhealthy_service_rolls_back_in_reverse_order() {
    let log: EventLog = Default::default();
    // Third service never answers healthy
    let probe = ScriptedProbe::healthy_for(&["summarizer", "rule-violation", "data-api"])
        .set("similarity", Health::Unhealthy);
    let sup = supervisor(FakeLauncher::new(log.clone()), probe);

    let err = sup.start(&fleet()).await.unwrap_err();
    match err {
        SupervisorError::StartupTimeout { service } => assert_eq!(service, "similarity"),
        other => panic!("expected StartupTimeout, got {other:?}"),
    }

    // The failed spawn and both predecessors are stopped, newest first
    assert_eq!(
        *log.lock(),
        vec![
            "spawn:summarizer",
            "spawn:rule-violation",
            "spawn:similarity",
            "stop:similarity",
            "stop:rule-violation",
            "stop:summarizer",
        ]
    );
    assert!(!sup.all_healthy());
    assert_eq!(sup.status()["summarizer"], ServiceState::Stopped);
}

#[tokio::test]
async fn spawn_failure_rolls_back_predecessors() {
    let log: EventLog = Default::default();
    let probe = ScriptedProbe::healthy_for(&["summarizer", "rule-violation", "similarity", "data-api"]);
    let mut launcher = FakeLauncher::new(log.clone());
    launcher.fail_spawn.push("rule-violation".to_string());
    let sup = supervisor(launcher, probe);

    let err = sup.start(&fleet()).await.unwrap_err();
    match err {
        SupervisorError::SpawnFailure { service, .. } => assert_eq!(service, "rule-violation"),
        other => panic!("expected SpawnFailure, got {other:?}"),
    }
    assert_eq!(*log.lock(), vec!["spawn:summarizer", "stop:summarizer"]);
}

#[tokio::test]
async fn port_conflict_is_rejected_before_any_spawn() {
    let log: EventLog = Default::default();
    let probe = ScriptedProbe::healthy_for(&["a", "b"]);
    let sup = supervisor(FakeLauncher::new(log.clone()), probe);

    let specs = vec![spec("a", 8001), spec("b", 8001)];
    let err = sup.start(&specs).await.unwrap_err();
    match err {
        SupervisorError::PortConflict { port, first, second } => {
            assert_eq!(port, 8001);
            assert_eq!(first, "a");
            assert_eq!(second, "b");
        }
        other => panic!("expected PortConflict, got {other:?}"),
    }
    assert!(log.lock().is_empty(), "nothing spawned on a rejected fleet");
}

#[tokio::test]
async fn shutdown_stops_in_reverse_order_exactly_once() {
    let log: EventLog = Default::default();
    let probe = ScriptedProbe::healthy_for(&["summarizer", "rule-violation", "similarity", "data-api"]);
    let sup = supervisor(FakeLauncher::new(log.clone()), probe);

    sup.start(&fleet()).await.unwrap();
    let stopped = sup.shutdown_all().await;
    assert_eq!(
        stopped,
        vec!["data-api", "similarity", "rule-violation", "summarizer"]
    );

    // Second request is a no-op
    assert!(sup.shutdown_all().await.is_empty());
    let stops: Vec<_> = log
        .lock()
        .iter()
        .filter(|e| e.starts_with("stop:"))
        .cloned()
        .collect();
    assert_eq!(stops.len(), 4);
    assert!(sup.is_shutting_down());
}

#[tokio::test]
async fn start_after_shutdown_is_rejected_without_spawning() {
    let log: EventLog = Default::default();
    let probe = ScriptedProbe::healthy_for(&["summarizer", "rule-violation", "similarity", "data-api"]);
    let sup = Arc::new(supervisor(FakeLauncher::new(log.clone()), probe));

    // Latch shutdown before start; the first loop iteration must observe it
    sup.shutdown_all().await;
    let err = sup.start(&fleet()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Cancelled));

    let log = log.lock();
    let spawns = log.iter().filter(|e| e.starts_with("spawn:")).count();
    let stops = log.iter().filter(|e| e.starts_with("stop:")).count();
    assert_eq!(spawns, 0, "cancelled startup must not spawn");
    assert_eq!(stops, 0);
}

#[tokio::test]
async fn interrupt_mid_startup_stops_started_services_without_orphans() {
    let log: EventLog = Default::default();
    // Third service never turns healthy, so start() sits in its health
    // wait until the interrupt arrives
    let probe = ScriptedProbe::healthy_for(&["summarizer", "rule-violation", "data-api"])
        .set("similarity", Health::Unhealthy);
    let mut config = test_config();
    config.startup_timeout_secs = 30;
    let sup = Arc::new(ServiceSupervisor::new(
        config,
        Arc::new(FakeLauncher::new(log.clone())),
        Arc::new(probe),
        Vec::new(),
    ));

    let starter = {
        let sup = sup.clone();
        tokio::spawn(async move { sup.start(&fleet()).await })
    };
    tokio::time::sleep(Duration::from_millis(400)).await;
    sup.shutdown_all().await;

    let err = starter.await.unwrap().unwrap_err();
    assert!(matches!(err, SupervisorError::Cancelled));

    // The three spawned services are stopped newest-first; the fourth is
    // never spawned and nothing is left running
    assert_eq!(
        *log.lock(),
        vec![
            "spawn:summarizer",
            "spawn:rule-violation",
            "spawn:similarity",
            "stop:similarity",
            "stop:rule-violation",
            "stop:summarizer",
        ]
    );
    assert_eq!(sup.status()["similarity"], ServiceState::Stopped);
    assert_eq!(sup.status()["summarizer"], ServiceState::Stopped);
}

#[tokio::test]
async fn stop_is_idempotent_per_service() {
    let log: EventLog = Default::default();
    let probe = ScriptedProbe::healthy_for(&["summarizer", "rule-violation", "similarity", "data-api"]);
    let sup = supervisor(FakeLauncher::new(log.clone()), probe);

    sup.start(&fleet()).await.unwrap();
    sup.stop("similarity").await;
    sup.stop("similarity").await;

    let stops = log.lock().iter().filter(|e| *e == "stop:similarity").count();
    assert_eq!(stops, 1, "second stop must be a no-op");
    assert_eq!(sup.status()["similarity"], ServiceState::Stopped);
    assert_eq!(sup.status()["data-api"], ServiceState::Healthy);
}
