//! The performance monitor service
//!
//! [`PerformanceMonitor`] owns every engine component. The application
//! constructs one, hands clones of it to producers and consumers, and calls
//! [`start`](PerformanceMonitor::start) / [`stop`](PerformanceMonitor::stop)
//! around its own lifecycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::detectors::{AnomalyDetector, ThresholdEvaluator, TrendAnalyzer, TrendResult};
use crate::monitoring::alerts::{Alert, AlertManager, AlertObserver, AlertStats, SubscriptionId};
use crate::monitoring::export::{self, DashboardSnapshot, SystemSection};
use crate::monitoring::health::{HealthAggregator, HealthProbe, SystemHealth};
use crate::monitoring::insights::{PredictiveInsight, PredictiveInsightGenerator};
use crate::monitoring::notify::WebhookNotifier;
use crate::monitoring::persistence::{MetricRecord, MetricSink, MetricWriter, PostgresMetricSink};
use crate::monitoring::scheduler::{collect_readings, MetricCollector, Scheduler, TickReport, TickTask};
use crate::samples::{
    names, tags, MetricProfile, MetricQuery, MetricSample, MetricStore, MetricSummary, ProfileRegistry,
    Tags, Threshold,
};
use crate::{MonitorError, Polarity, Result, TimeWindow};

/// Shared engine state, also the scheduler's tick task
struct MonitorCore {
    config: MonitorConfig,
    store: MetricStore,
    profiles: Arc<ProfileRegistry>,
    thresholds: ThresholdEvaluator,
    anomalies: AnomalyDetector,
    trends: TrendAnalyzer,
    alerts: AlertManager,
    health: HealthAggregator,
    insights: PredictiveInsightGenerator,
    collectors: RwLock<Vec<Arc<dyn MetricCollector>>>,
    writer: RwLock<Option<MetricWriter>>,

    /// Serializes detector runs so per-write and scheduled evaluation never interleave
    evaluation: Mutex<()>,

    started_at: Instant,
}

impl MonitorCore {
    /// Samples needed by the history-based detectors
    fn evaluation_depth(&self) -> usize {
        let anomaly = self.anomalies.config();
        anomaly
            .min_history
            .max(anomaly.recent_window + anomaly.baseline_window)
            .max(self.trends.config().window)
    }

    fn ingest(&self, sample: &MetricSample) {
        self.store.append(sample.clone());
        metrics::increment_counter!("perfwatch_samples_recorded_total");
        self.persist(sample);
    }

    fn persist(&self, sample: &MetricSample) {
        let writer = self.writer.read();
        let Some(writer) = writer.as_ref() else {
            return;
        };

        let record = MetricRecord::from_sample(
            sample,
            self.profiles.threshold(&sample.name).as_ref(),
            self.profiles.category(&sample.name),
            self.config.persistence.organization_id.as_deref(),
        );
        writer.submit(record);
    }

    /// Run all detectors for one metric. Caller holds the evaluation guard.
    fn evaluate_metric(&self, name: &str, latest: &MetricSample) -> usize {
        let history = self.store.recent(name, self.evaluation_depth());
        let polarity = self.profiles.polarity(name);

        [
            self.thresholds.evaluate(latest, &self.alerts),
            self.anomalies.evaluate(name, &history, &self.alerts),
            self.trends.evaluate(name, &history, polarity, &self.alerts),
        ]
        .into_iter()
        .flatten()
        .filter(|outcome| outcome.is_created())
        .count()
    }

    fn record(&self, sample: MetricSample) {
        if !sample.value.is_finite() {
            warn!(metric = %sample.name, value = sample.value, "Ignoring non-finite sample");
            return;
        }
        debug!(metric = %sample.name, value = sample.value, "Recording sample");

        let _guard = self.evaluation.lock();
        self.ingest(&sample);
        if self.config.scheduler.evaluate_on_write {
            self.evaluate_metric(&sample.name, &sample);
        }
    }

    /// Evaluate every tracked metric. Caller holds the evaluation guard.
    fn evaluate_all(&self) -> (usize, usize) {
        let mut evaluated = 0;
        let mut created = 0;

        for name in self.store.metric_names() {
            let Some(latest) = self.store.latest(&name) else {
                continue;
            };
            evaluated += 1;
            created += self.evaluate_metric(&name, &latest);
        }
        (evaluated, created)
    }
}

#[async_trait]
impl TickTask for MonitorCore {
    async fn run_tick(&self) -> TickReport {
        let started = Instant::now();

        let collectors = self.collectors.read().clone();
        let (readings, collector_failures) =
            collect_readings(&collectors, self.config.scheduler.collector_timeout()).await;
        let readings_collected = readings.len();

        let (metrics_evaluated, alerts_created, samples_purged, alerts_purged) = {
            let _guard = self.evaluation.lock();
            for reading in readings {
                let sample = reading.into_sample();
                if sample.value.is_finite() {
                    self.ingest(&sample);
                }
            }

            let (evaluated, created) = self.evaluate_all();
            let now = Utc::now();
            let samples_purged = self.store.purge_expired(now);
            let alerts_purged = self
                .alerts
                .cleanup_at(now, self.config.scheduler.alert_retention());
            (evaluated, created, samples_purged, alerts_purged)
        };

        TickReport {
            readings_collected,
            collector_failures,
            metrics_evaluated,
            alerts_created,
            samples_purged,
            alerts_purged,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

/// Explicitly constructed monitoring service
#[derive(Clone)]
pub struct PerformanceMonitor {
    core: Arc<MonitorCore>,
    scheduler: Arc<Scheduler>,
    webhook_subscription: Arc<Mutex<Option<SubscriptionId>>>,
}

impl PerformanceMonitor {
    /// Build a monitor from validated configuration
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;

        let profiles = Arc::new(ProfileRegistry::with_conventional_profiles(
            config.trend.default_polarity,
        ));
        for profile in &config.profiles {
            profiles.apply_config(profile)?;
        }

        let core = MonitorCore {
            store: MetricStore::from_config(&config.store),
            thresholds: ThresholdEvaluator::new(Arc::clone(&profiles)),
            anomalies: AnomalyDetector::new(config.anomaly.clone()),
            trends: TrendAnalyzer::new(config.trend.clone()),
            alerts: AlertManager::new(),
            health: HealthAggregator::new(&config.health),
            insights: PredictiveInsightGenerator::new(config.insights.clone()),
            collectors: RwLock::new(Vec::new()),
            writer: RwLock::new(None),
            evaluation: Mutex::new(()),
            started_at: Instant::now(),
            profiles,
            config,
        };

        Ok(Self {
            scheduler: Arc::new(Scheduler::new(core.config.scheduler.interval())),
            core: Arc::new(core),
            webhook_subscription: Arc::new(Mutex::new(None)),
        })
    }

    /// Start the scheduler, persistence and webhook delivery
    pub async fn start(&self) -> Result<()> {
        if self.scheduler.is_running() {
            return Err(MonitorError::AlreadyRunning);
        }
        let config = &self.core.config;

        if config.persistence.enabled && self.core.writer.read().is_none() {
            if let Some(url) = &config.persistence.database_url {
                match PostgresMetricSink::connect(url).await {
                    Ok(sink) => self.attach_sink(Arc::new(sink))?,
                    Err(e) => warn!(error = %e, "Metric persistence unavailable, continuing in memory only"),
                }
            }
        }

        if !config.alerting.webhook_urls.is_empty() {
            let mut subscription = self.webhook_subscription.lock();
            if subscription.is_none() {
                let notifier =
                    WebhookNotifier::from_config(&config.alerting, &config.global.instance_name)?;
                *subscription = Some(self.core.alerts.subscribe(Arc::new(notifier)));
            }
        }

        let task: Arc<dyn TickTask> = self.core.clone();
        self.scheduler.start(task)?;

        info!(
            interval_secs = config.scheduler.interval_secs,
            profiles = self.core.profiles.list().len(),
            "🚀 Performance monitor started"
        );
        Ok(())
    }

    /// Stop the scheduler after any in-flight pass, then flush persistence
    pub async fn stop(&self) {
        self.scheduler.stop().await;

        if let Some(id) = self.webhook_subscription.lock().take() {
            self.core.alerts.unsubscribe(id);
        }

        let writer = self.core.writer.write().take();
        if let Some(writer) = writer {
            writer.shutdown().await;
        }
        info!("Performance monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Persist every recorded sample to `sink` through the bounded queue.
    /// Fails outside a tokio runtime.
    pub fn attach_sink(&self, sink: Arc<dyn MetricSink>) -> Result<()> {
        let writer = MetricWriter::spawn(sink, self.core.config.persistence.channel_capacity)?;
        *self.core.writer.write() = Some(writer);
        Ok(())
    }

    // Producer API. Recording never fails; invalid input is logged and dropped.

    pub fn record_metric(
        &self,
        name: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        tags: Tags,
        context: HashMap<String, String>,
    ) {
        self.record_sample(MetricSample::new(name, value, unit).with_tags(tags).with_context(context));
    }

    /// Record a sample, honoring its timestamp
    pub fn record_sample(&self, sample: MetricSample) {
        self.core.record(sample);
    }

    pub fn record_api_response(&self, endpoint: &str, method: &str, status: u16, duration_ms: f64) {
        let tagged = |name: &str, value: f64, unit: &str| {
            MetricSample::new(name, value, unit)
                .with_tag(tags::CATEGORY, "api")
                .with_tag(tags::ENDPOINT, endpoint)
                .with_tag(tags::METHOD, method)
                .with_tag(tags::STATUS, status.to_string())
        };

        self.record_sample(tagged(names::API_RESPONSE_TIME, duration_ms, "ms"));
        if status >= 500 {
            self.record_sample(tagged(names::API_ERRORS, 1.0, "count"));
        }
    }

    pub fn record_ai_operation(
        &self,
        operation: &str,
        model: &str,
        duration_ms: f64,
        tokens: u64,
        cost_usd: f64,
        success: bool,
    ) {
        let tagged = |name: &str, value: f64, unit: &str| {
            MetricSample::new(name, value, unit)
                .with_tag(tags::CATEGORY, "ai")
                .with_tag(tags::OPERATION, operation)
                .with_tag(tags::MODEL, model)
                .with_tag(tags::SUCCESS, success.to_string())
        };

        self.record_sample(tagged(names::AI_OPERATION_DURATION, duration_ms, "ms"));
        self.record_sample(tagged(names::AI_TOKENS_USED, tokens as f64, "tokens"));
        self.record_sample(tagged(names::AI_OPERATION_COST, cost_usd, "usd"));
    }

    pub fn record_database_query(&self, operation: &str, table: &str, duration_ms: f64, rows: u64) {
        let mut context = HashMap::new();
        context.insert("rows".to_string(), rows.to_string());

        self.record_sample(
            MetricSample::new(names::DB_QUERY_DURATION, duration_ms, "ms")
                .with_tag(tags::CATEGORY, "database")
                .with_tag(tags::OPERATION, operation)
                .with_tag(tags::TABLE, table)
                .with_context(context),
        );
    }

    pub fn record_cache_access(&self, cache: &str, hit: bool) {
        self.record_sample(
            MetricSample::new(names::CACHE_HIT, if hit { 1.0 } else { 0.0 }, "ratio")
                .with_tag(tags::CATEGORY, "cache")
                .with_tag(tags::CACHE, cache),
        );
    }

    pub fn record_error(&self, kind: &str, message: &str) {
        let mut context = HashMap::new();
        context.insert("message".to_string(), message.to_string());

        self.record_sample(
            MetricSample::new(names::ERRORS, 1.0, "count")
                .with_tag(tags::CATEGORY, "error")
                .with_tag(tags::KIND, kind)
                .with_context(context),
        );
    }

    // Consumer API

    pub fn get_active_alerts(&self) -> Vec<Alert> {
        self.core.alerts.list_active()
    }

    pub fn get_alert(&self, id: &str) -> Option<Alert> {
        self.core.alerts.get(id)
    }

    /// Resolve an alert; false when the id is unknown
    pub fn resolve_alert(&self, id: &str, resolved_by: Option<&str>) -> bool {
        self.core.alerts.resolve(id, resolved_by)
    }

    pub fn alert_stats(&self) -> AlertStats {
        self.core.alerts.stats()
    }

    pub async fn get_system_health(&self) -> SystemHealth {
        self.core.health.system_health(&self.core.alerts).await
    }

    /// Trend of every metric with enough samples inside `timeframe`
    pub fn get_performance_trends(&self, timeframe: TimeWindow) -> Vec<TrendResult> {
        let now = Utc::now();
        self.core
            .store
            .metric_names()
            .into_iter()
            .filter_map(|name| {
                let history = self.core.store.history(&name);
                let polarity = self.core.profiles.polarity(&name);
                self.core
                    .trends
                    .analyze_window(&name, &history, timeframe, now, polarity)
            })
            .collect()
    }

    /// Project every metric over `horizon`; projected threshold breaches
    /// raise prediction alerts
    pub fn generate_predictive_insights(&self, horizon: TimeWindow) -> Vec<PredictiveInsight> {
        let core = &self.core;
        let insights = core
            .insights
            .generate(&core.store, &core.profiles, &core.trends, horizon);

        let _guard = core.evaluation.lock();
        for insight in &insights {
            let breach = core
                .profiles
                .threshold(&insight.metric)
                .and_then(|threshold| PredictiveInsightGenerator::detect_breach(insight, &threshold));
            if let Some(detection) = breach {
                core.alerts.upsert(detection);
            }
        }
        insights
    }

    /// Register or replace a metric threshold, keeping its polarity
    pub fn set_threshold(&self, metric: &str, warning: f64, critical: f64) -> Result<Threshold> {
        self.core.profiles.set_threshold(metric, warning, critical)
    }

    pub fn set_profile(&self, profile: MetricProfile) -> Result<()> {
        self.core.profiles.upsert(profile)
    }

    pub fn set_polarity(&self, metric: &str, polarity: Polarity) {
        self.core.profiles.set_polarity(metric, polarity);
    }

    pub fn register_probe(&self, name: impl Into<String>, probe: Arc<dyn HealthProbe>) {
        self.core.health.register_probe(name, probe);
    }

    pub fn register_collector(&self, collector: Arc<dyn MetricCollector>) {
        info!(collector = collector.name(), "Registered metric collector");
        self.core.collectors.write().push(collector);
    }

    /// Observers are called synchronously while detectors run and must not
    /// record samples themselves
    pub fn subscribe(&self, observer: Arc<dyn AlertObserver>) -> SubscriptionId {
        self.core.alerts.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.alerts.unsubscribe(id)
    }

    /// Prometheus text for samples recorded within `window`
    pub fn export_prometheus(&self, window: TimeWindow) -> String {
        export::prometheus_text(&self.core.store, Utc::now() - window.duration())
    }

    pub async fn dashboard_snapshot(&self, window: TimeWindow) -> DashboardSnapshot {
        let health = self.get_system_health().await;
        let system = SystemSection {
            status: health.status,
            health_score: health.score,
            alerts: self.core.alerts.stats(),
            tracked_metrics: self.core.store.metric_names().len(),
            uptime_secs: self.core.started_at.elapsed().as_secs(),
        };
        DashboardSnapshot::build(
            &self.core.config.global.instance_name,
            &self.core.store,
            window,
            Utc::now(),
            system,
        )
    }

    pub fn query(&self, query: &MetricQuery) -> Vec<MetricSample> {
        self.core.store.query(query)
    }

    pub fn summary(&self, name: &str, since: Option<DateTime<Utc>>) -> Option<MetricSummary> {
        self.core.store.summary(name, since)
    }

    /// Run one collection, evaluation and cleanup pass now
    pub async fn run_tick(&self) -> TickReport {
        self.core.run_tick().await
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.core.config
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.core.profiles
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.core.alerts
    }

    pub fn store(&self) -> &MetricStore {
        &self.core.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::alerts::AlertType;
    use crate::monitoring::scheduler::MetricReading;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(MonitorConfig::default()).unwrap()
    }

    struct QueueCollector;

    #[async_trait]
    impl MetricCollector for QueueCollector {
        fn name(&self) -> &str {
            "queue"
        }

        async fn collect(&self) -> Result<Vec<MetricReading>> {
            Ok(vec![MetricReading::new("queue_depth", 7.0, "count")])
        }
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let monitor = monitor();
        assert!(matches!(
            monitor.set_threshold("latency", 500.0, 100.0),
            Err(MonitorError::InvalidThreshold { .. })
        ));
        assert!(monitor.profiles().threshold("latency").is_none());
    }

    #[test]
    fn test_record_never_fails_on_bad_values() {
        let monitor = monitor();
        monitor.record_metric("latency", f64::NAN, "ms", Tags::new(), HashMap::new());
        monitor.record_metric("latency", f64::INFINITY, "ms", Tags::new(), HashMap::new());
        assert_eq!(monitor.store().len("latency"), 0);
    }

    #[test]
    fn test_api_response_wrapper() {
        let monitor = monitor();
        monitor.record_api_response("/chat", "POST", 503, 120.0);
        monitor.record_api_response("/chat", "POST", 200, 80.0);

        let samples = monitor.query(&MetricQuery::new().name(names::API_RESPONSE_TIME).tag(tags::STATUS, "503"));
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].tag(tags::ENDPOINT), Some("/chat"));
        assert_eq!(monitor.store().len(names::API_ERRORS), 1);
    }

    #[test]
    fn test_conventional_threshold_fires_on_write() {
        let monitor = monitor();
        monitor.record_database_query("select", "users", 3500.0, 10);

        let alerts = monitor.get_active_alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Threshold);
        assert_eq!(alerts[0].context.get("rows").map(String::as_str), Some("10"));
    }

    #[test]
    fn test_configured_profiles_applied() {
        let mut config = MonitorConfig::default();
        config.profiles.push(crate::config::ProfileConfig {
            name: "throughput".to_string(),
            unit: "rps".to_string(),
            warning: None,
            critical: None,
            polarity: Some(Polarity::HigherIsBetter),
            category: None,
        });
        let monitor = PerformanceMonitor::new(config).unwrap();
        assert_eq!(monitor.profiles().polarity("throughput"), Polarity::HigherIsBetter);
    }

    struct NullSink;

    #[async_trait]
    impl MetricSink for NullSink {
        async fn write(&self, _record: &MetricRecord) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_attach_sink_outside_runtime_is_an_error() {
        let monitor = monitor();
        assert!(monitor.attach_sink(Arc::new(NullSink)).is_err());

        // Recording still works without persistence
        monitor.record_metric("latency", 120.0, "ms", Tags::new(), HashMap::new());
        assert_eq!(monitor.store().len("latency"), 1);
    }

    #[tokio::test]
    async fn test_tick_collects_and_purges() {
        let monitor = monitor();
        monitor.register_collector(Arc::new(QueueCollector));
        monitor.record_sample(
            MetricSample::new("stale", 1.0, "ms").at(Utc::now() - chrono::Duration::days(2)),
        );

        let report = monitor.run_tick().await;
        assert_eq!(report.readings_collected, 1);
        assert_eq!(report.collector_failures, 0);
        assert_eq!(report.samples_purged, 1);
        assert_eq!(monitor.store().len("queue_depth"), 1);
        assert_eq!(monitor.store().len("stale"), 0);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let monitor = monitor();
        monitor.start().await.unwrap();
        assert!(matches!(monitor.start().await, Err(MonitorError::AlreadyRunning)));
        monitor.stop().await;
        assert!(!monitor.is_running());
    }
}
