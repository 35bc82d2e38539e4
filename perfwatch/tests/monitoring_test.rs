//! Integration tests for monitoring components
//!
//! Exercises health aggregation, alert observers, persistence and exports
//! through the public monitor API.

use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;
use perfwatch::monitoring::persistence::{MetricRecord, MetricSink};
use perfwatch::monitoring::{AlertEvent, AlertObserver, HealthProbe, HealthStatus, ProbeReading};
use perfwatch::{MonitorConfig, MonitorError, PerformanceMonitor, Result, TimeWindow};
use std::sync::Arc;

mock! {
    pub Probe {}

    #[async_trait]
    impl HealthProbe for Probe {
        async fn check(&self) -> Result<ProbeReading>;
    }
}

fn healthy_reading() -> ProbeReading {
    ProbeReading {
        latency_ms: 120.0,
        error_rate: 0.5,
        throughput: 40.0,
        availability: 99.9,
    }
}

fn healthy_probe() -> Arc<MockProbe> {
    let mut probe = MockProbe::new();
    probe.expect_check().returning(|| Ok(healthy_reading()));
    Arc::new(probe)
}

fn monitor() -> PerformanceMonitor {
    PerformanceMonitor::new(MonitorConfig::default()).expect("default config is valid")
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<(String, String)>>,
}

impl AlertObserver for EventLog {
    fn on_alert(&self, event: &AlertEvent) {
        let kind = match event {
            AlertEvent::Created(_) => "created",
            AlertEvent::Resolved(_) => "resolved",
        };
        self.events
            .lock()
            .push((kind.to_string(), event.alert().id.clone()));
    }
}

#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<MetricRecord>>,
}

#[async_trait]
impl MetricSink for MemorySink {
    async fn write(&self, record: &MetricRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl MetricSink for FailingSink {
    async fn write(&self, _record: &MetricRecord) -> Result<()> {
        Err(MonitorError::internal("database unavailable"))
    }
}

#[tokio::test]
async fn test_system_health_is_mean_of_components() -> Result<()> {
    let monitor = monitor();

    for name in ["api", "database", "cache", "queue", "search"] {
        monitor.register_probe(name, healthy_probe());
    }
    let mut broken = MockProbe::new();
    broken
        .expect_check()
        .returning(|| Err(MonitorError::probe("llm", "connection reset")));
    monitor.register_probe("llm", Arc::new(broken));

    let health = monitor.get_system_health().await;

    assert_eq!(health.components.len(), 6);
    assert!((health.score - 83.333).abs() < 0.01);
    assert_eq!(health.status, HealthStatus::Healthy);

    let llm = health.components.iter().find(|c| c.name == "llm").unwrap();
    assert_eq!(llm.score, 0.0);
    assert_eq!(llm.status, HealthStatus::Unhealthy);

    Ok(())
}

#[tokio::test]
async fn test_penalties_degrade_component() -> Result<()> {
    let monitor = monitor();
    let mut slow = MockProbe::new();
    slow.expect_check().returning(|| {
        Ok(ProbeReading {
            latency_ms: 3500.0,
            ..healthy_reading()
        })
    });
    monitor.register_probe("api", Arc::new(slow));

    let health = monitor.get_system_health().await;
    assert_eq!(health.score, 80.0);
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.components[0].violations, vec!["high_latency".to_string()]);
    assert!(health.recommendations.iter().any(|r| r.starts_with("api:")));

    Ok(())
}

#[tokio::test]
async fn test_critical_alerts_reported_in_health() -> Result<()> {
    let monitor = monitor();
    monitor.register_probe("api", healthy_probe());
    monitor.record_api_response("/chat", "POST", 200, 7000.0);

    let health = monitor.get_system_health().await;
    assert_eq!(health.critical_alerts.len(), 1);
    assert_eq!(health.critical_alerts[0].metric, "api_response_time");

    Ok(())
}

#[tokio::test]
async fn test_observers_follow_alert_lifecycle() -> Result<()> {
    let monitor = monitor();
    let log = Arc::new(EventLog::default());
    let subscription = monitor.subscribe(log.clone());

    monitor.set_threshold("queue_depth", 100.0, 500.0)?;
    monitor.record_metric("queue_depth", 150.0, "count", Default::default(), Default::default());
    monitor.record_metric("queue_depth", 175.0, "count", Default::default(), Default::default());

    let active = monitor.get_active_alerts();
    assert_eq!(active.len(), 1);
    assert!(monitor.resolve_alert(&active[0].id, Some("oncall")));
    assert!(!monitor.resolve_alert("missing-id", None));

    assert!(monitor.unsubscribe(subscription));
    monitor.record_metric("queue_depth", 600.0, "count", Default::default(), Default::default());

    let events = log.events.lock().clone();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], ("created".to_string(), active[0].id.clone()));
    assert_eq!(events[1], ("resolved".to_string(), active[0].id.clone()));

    // The recurrence produced a fresh alert that the unsubscribed observer never saw
    let recurring = monitor.get_active_alerts();
    assert_eq!(recurring.len(), 1);
    assert_ne!(recurring[0].id, active[0].id);

    Ok(())
}

#[tokio::test]
async fn test_persistence_receives_records() -> Result<()> {
    let mut config = MonitorConfig::default();
    config.persistence.organization_id = Some("org-1".to_string());
    let monitor = PerformanceMonitor::new(config)?;

    let sink = Arc::new(MemorySink::default());
    monitor.attach_sink(sink.clone())?;

    monitor.record_ai_operation("chat", "gpt-4", 1800.0, 1200, 0.04, true);
    monitor.stop().await;

    let records = sink.records.lock();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.organization_id.as_deref() == Some("org-1")));
    assert!(records.iter().any(|r| r.name == "ai_operation_cost" && r.category == "ai"));

    Ok(())
}

#[tokio::test]
async fn test_persistence_failure_does_not_affect_alerting() -> Result<()> {
    let monitor = monitor();
    monitor.attach_sink(Arc::new(FailingSink))?;

    monitor.record_database_query("select", "tickets", 4000.0, 1);
    monitor.stop().await;

    assert_eq!(monitor.get_active_alerts().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_exports() -> Result<()> {
    let monitor = monitor();
    monitor.record_api_response("/search", "GET", 200, 150.0);
    monitor.record_cache_access("embeddings", true);
    monitor.record_cache_access("embeddings", false);
    monitor.record_error("timeout", "upstream took too long");

    let text = monitor.export_prometheus(TimeWindow::OneHour);
    assert!(text.contains("api_response_time_avg 150 "));
    assert!(text.contains("# TYPE cache_hit_p95 gauge"));

    let snapshot = monitor.dashboard_snapshot(TimeWindow::OneHour).await;
    assert_eq!(snapshot.cache.hit_rate, Some(0.5));
    assert_eq!(snapshot.errors.total, 1);
    assert_eq!(snapshot.system.tracked_metrics, 3);
    assert_eq!(snapshot.system.status, HealthStatus::Unknown);

    Ok(())
}
