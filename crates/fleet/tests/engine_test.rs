//! Integration tests for the health check engine

use async_trait::async_trait;
use fleet::{
    CheckSettings, EngineMetrics, HealthCheckEngine, Machine, MachineRegistry, ProbeError, Prober,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ALERT: &str = "http://alerts.example.com/notify";

/// Prober answering from a per-URL script; unscripted URLs answer 200
#[derive(Default)]
struct ScriptedProber {
    script: Mutex<HashMap<String, VecDeque<bool>>>,
    delay: Duration,
    alerts: AtomicUsize,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProber {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn script(self, hostname: &str, responses: &[bool]) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(health_url(hostname), responses.iter().copied().collect());
        self
    }

    fn alerts(&self) -> usize {
        self.alerts.load(Ordering::SeqCst)
    }

    fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn get(&self, url: &str) -> Result<(), ProbeError> {
        if url == ALERT {
            self.alerts.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let healthy = self
            .script
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(true);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.probes.fetch_add(1, Ordering::SeqCst);

        if healthy {
            Ok(())
        } else {
            Err(ProbeError::Status {
                url: url.to_string(),
                code: 503,
            })
        }
    }
}

fn health_url(hostname: &str) -> String {
    format!("http://{hostname}/health")
}

fn settings(retries: u32) -> CheckSettings {
    CheckSettings {
        retries,
        alert_endpoint: ALERT.to_string(),
        interval: Duration::from_millis(10),
        ..Default::default()
    }
}

async fn is_active(registry: &MachineRegistry, hostname: &str) -> bool {
    registry.get(hostname).await.unwrap().active
}

#[tokio::test]
async fn test_threshold_crossed_after_three_failures() {
    let registry = Arc::new(MachineRegistry::from_machines([
        Machine::new("a.example.com").with_active(true),
    ]));
    let prober = Arc::new(ScriptedProber::default().script("a.example.com", &[false; 3]));
    let mut engine = HealthCheckEngine::new(registry.clone(), prober.clone(), settings(2));

    engine.tick().await;
    assert!(is_active(&registry, "a.example.com").await);
    assert_eq!(engine.retry_count("a.example.com"), 1);

    engine.tick().await;
    assert!(is_active(&registry, "a.example.com").await);
    assert_eq!(engine.retry_count("a.example.com"), 2);
    assert_eq!(prober.alerts(), 0);

    let report = engine.tick().await;
    assert_eq!(report.alerts, 1);
    assert!(!is_active(&registry, "a.example.com").await);
    assert_eq!(prober.alerts(), 1);
    assert_eq!(engine.retry_count("a.example.com"), 0);
}

#[tokio::test]
async fn test_success_then_two_failures_with_threshold_one() {
    let registry = Arc::new(MachineRegistry::from_machines([Machine::new("b.example.com")]));
    let prober =
        Arc::new(ScriptedProber::default().script("b.example.com", &[true, false, false]));
    let mut engine = HealthCheckEngine::new(registry.clone(), prober.clone(), settings(1));

    engine.tick().await;
    assert!(is_active(&registry, "b.example.com").await);

    engine.tick().await;
    assert!(is_active(&registry, "b.example.com").await);
    assert_eq!(prober.alerts(), 0);

    engine.tick().await;
    assert!(!is_active(&registry, "b.example.com").await);
    assert_eq!(prober.alerts(), 1);
}

#[tokio::test]
async fn test_failures_below_threshold_leave_flag_unchanged() {
    let registry = Arc::new(MachineRegistry::from_machines([
        Machine::new("up.example.com").with_active(true),
        Machine::new("down.example.com"),
    ]));
    let prober = Arc::new(
        ScriptedProber::default()
            .script("up.example.com", &[false; 3])
            .script("down.example.com", &[false; 3]),
    );
    let mut engine = HealthCheckEngine::new(registry.clone(), prober.clone(), settings(3));

    for _ in 0..3 {
        engine.tick().await;
    }

    assert!(is_active(&registry, "up.example.com").await);
    assert!(!is_active(&registry, "down.example.com").await);
    assert_eq!(engine.retry_count("up.example.com"), 3);
    assert_eq!(engine.retry_count("down.example.com"), 3);
    assert_eq!(prober.alerts(), 0);
}

#[tokio::test]
async fn test_fresh_run_required_after_alert() {
    let registry = Arc::new(MachineRegistry::from_machines([Machine::new("c.example.com")]));
    let prober = Arc::new(ScriptedProber::default().script("c.example.com", &[false; 4]));
    let mut engine = HealthCheckEngine::new(registry.clone(), prober.clone(), settings(1));

    engine.tick().await;
    engine.tick().await;
    assert_eq!(prober.alerts(), 1);

    engine.tick().await;
    assert_eq!(prober.alerts(), 1);
    assert_eq!(engine.retry_count("c.example.com"), 1);

    engine.tick().await;
    assert_eq!(prober.alerts(), 2);
}

#[tokio::test]
async fn test_counter_survives_intervening_success() {
    let registry = Arc::new(MachineRegistry::from_machines([Machine::new("d.example.com")]));
    let prober = Arc::new(
        ScriptedProber::default().script("d.example.com", &[false, false, true, false]),
    );
    let mut engine = HealthCheckEngine::new(registry.clone(), prober.clone(), settings(2));

    engine.tick().await;
    engine.tick().await;
    engine.tick().await;
    assert!(is_active(&registry, "d.example.com").await);
    assert_eq!(engine.retry_count("d.example.com"), 2);

    let report = engine.tick().await;
    assert_eq!(report.alerts, 1);
    assert!(!is_active(&registry, "d.example.com").await);
    assert_eq!(prober.alerts(), 1);
}

#[tokio::test]
async fn test_zero_threshold_alerts_on_first_failure() {
    let registry = Arc::new(MachineRegistry::from_machines([
        Machine::new("e.example.com").with_active(true),
    ]));
    let prober = Arc::new(ScriptedProber::default().script("e.example.com", &[false]));
    let mut engine = HealthCheckEngine::new(registry.clone(), prober.clone(), settings(0));

    engine.tick().await;

    assert!(!is_active(&registry, "e.example.com").await);
    assert_eq!(prober.alerts(), 1);
}

#[tokio::test]
async fn test_readonly_never_writes_but_still_alerts() {
    let registry = Arc::new(MachineRegistry::from_machines([
        Machine::new("ro-up.example.com").with_active(true),
        Machine::new("ro-down.example.com"),
    ]));
    let prober = Arc::new(
        ScriptedProber::default()
            .script("ro-up.example.com", &[false, false])
            .script("ro-down.example.com", &[true, true]),
    );
    let mut engine = HealthCheckEngine::new(
        registry.clone(),
        prober.clone(),
        CheckSettings {
            readonly: true,
            ..settings(1)
        },
    );

    engine.tick().await;
    engine.tick().await;

    assert!(is_active(&registry, "ro-up.example.com").await);
    assert!(!is_active(&registry, "ro-down.example.com").await);
    assert_eq!(prober.alerts(), 1);
    assert_eq!(engine.retry_count("ro-up.example.com"), 0);
}

#[tokio::test]
async fn test_never_probed_machine_has_zero_counter() {
    let registry = Arc::new(MachineRegistry::from_machines([
        Machine::new("idle.example.com").with_active(true),
    ]));
    let engine = HealthCheckEngine::new(registry.clone(), Arc::new(ScriptedProber::default()), settings(1));

    assert_eq!(engine.retry_count("idle.example.com"), 0);
    assert!(is_active(&registry, "idle.example.com").await);
}

#[tokio::test]
async fn test_hundred_machines_probed_concurrently() {
    let hosts: Vec<String> = (0..100).map(|i| format!("host-{i}.example.com")).collect();
    let registry = Arc::new(MachineRegistry::from_machines(
        hosts.iter().map(|h| Machine::new(h.clone())),
    ));

    // Odd hosts fail once, even hosts succeed
    let mut prober = ScriptedProber::with_delay(Duration::from_millis(20));
    for (i, host) in hosts.iter().enumerate() {
        prober = prober.script(host, &[i % 2 == 0]);
    }
    let prober = Arc::new(prober);

    let metrics = Arc::new(EngineMetrics::new());
    let mut engine = HealthCheckEngine::new(registry.clone(), prober.clone(), settings(5))
        .with_metrics(metrics.clone());
    let report = engine.tick().await;

    assert_eq!(report.probed, 100);
    assert_eq!(report.succeeded, 50);
    assert_eq!(report.failed, 50);
    assert_eq!(prober.probes(), 100);
    assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
    assert!(prober.max_in_flight.load(Ordering::SeqCst) > 1);
    assert_eq!(metrics.probes(true), 50);
    assert_eq!(metrics.probes(false), 50);

    let snapshot = registry.len().await;
    assert_eq!(snapshot, 100);
    for (i, host) in hosts.iter().enumerate() {
        let expected = if i % 2 == 0 { 0 } else { 1 };
        assert_eq!(engine.retry_count(host), expected, "{host}");
        assert_eq!(is_active(&registry, host).await, i % 2 == 0, "{host}");
    }
}

#[tokio::test]
async fn test_engine_stops_on_cancel() {
    let registry = Arc::new(MachineRegistry::from_machines([Machine::new("f.example.com")]));
    let prober = Arc::new(ScriptedProber::default());
    let stop = CancellationToken::new();

    let handle =
        HealthCheckEngine::new(registry.clone(), prober.clone(), settings(1)).start(stop.clone());

    tokio::time::sleep(Duration::from_millis(100)).await;
    stop.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("engine did not stop")
        .unwrap();

    let probes = prober.probes();
    assert!(probes > 0);
    assert!(is_active(&registry, "f.example.com").await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(prober.probes(), probes);
}

#[tokio::test]
async fn test_ticks_never_overlap() {
    let registry = Arc::new(MachineRegistry::from_machines([Machine::new("slow.example.com")]));
    // Each probe outlasts several intervals
    let prober = Arc::new(ScriptedProber::with_delay(Duration::from_millis(40)));
    let stop = CancellationToken::new();

    let handle = HealthCheckEngine::new(
        registry.clone(),
        prober.clone(),
        CheckSettings {
            interval: Duration::from_millis(5),
            ..settings(1)
        },
    )
    .start(stop.clone());

    tokio::time::sleep(Duration::from_millis(200)).await;
    stop.cancel();
    handle.await.unwrap();

    assert!(prober.probes() >= 2);
    assert_eq!(prober.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_tick() {
    let registry = Arc::new(MachineRegistry::from_machines([Machine::new("g.example.com")]));
    let prober = Arc::new(ScriptedProber::with_delay(Duration::from_millis(150)));
    let stop = CancellationToken::new();

    let handle =
        HealthCheckEngine::new(registry.clone(), prober.clone(), settings(1)).start(stop.clone());

    // First tick fires at ~10ms, its probe is still running at 50ms
    tokio::time::sleep(Duration::from_millis(50)).await;
    stop.cancel();
    handle.await.unwrap();

    assert!(prober.probes() >= 1);
    assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
    assert!(is_active(&registry, "g.example.com").await);
}
