//! Periodic monitoring pass and external metric collectors
//!
//! One ticker drives collection, evaluation and retention cleanup. Stopping
//! cancels the ticker; a pass already running finishes before the loop exits.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::samples::{MetricSample, Tags};
use crate::{MonitorError, Result};

/// A value pulled from an external collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub name: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub tags: Tags,
}

impl MetricReading {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            tags: Tags::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn into_sample(self) -> MetricSample {
        MetricSample::new(self.name, self.value, self.unit).with_tags(self.tags)
    }
}

/// External probe pulled on every scheduler tick
#[async_trait]
pub trait MetricCollector: Send + Sync {
    fn name(&self) -> &str;

    async fn collect(&self) -> Result<Vec<MetricReading>>;
}

/// Pull every collector concurrently, each bounded by `timeout`.
///
/// Failed or timed-out collectors are logged and contribute nothing.
pub async fn collect_readings(
    collectors: &[Arc<dyn MetricCollector>],
    timeout: Duration,
) -> (Vec<MetricReading>, usize) {
    let results = futures::future::join_all(collectors.iter().map(|collector| async move {
        match tokio::time::timeout(timeout, collector.collect()).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::collector(
                collector.name().to_string(),
                format!("timed out after {}ms", timeout.as_millis()),
            )),
        }
    }))
    .await;

    let mut readings = Vec::new();
    let mut failures = 0;
    for (collector, result) in collectors.iter().zip(results) {
        match result {
            Ok(mut batch) => readings.append(&mut batch),
            Err(e) => {
                failures += 1;
                warn!(collector = collector.name(), error = %e, "Metric collection failed");
            }
        }
    }
    (readings, failures)
}

/// Outcome of one monitoring pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub readings_collected: usize,
    pub collector_failures: usize,
    pub metrics_evaluated: usize,
    pub alerts_created: usize,
    pub samples_purged: usize,
    pub alerts_purged: usize,
    pub duration_ms: f64,
}

/// Work executed on every tick
#[async_trait]
pub trait TickTask: Send + Sync + 'static {
    async fn run_tick(&self) -> TickReport;
}

/// Fixed-interval ticker with explicit start/stop
pub struct Scheduler {
    interval: Duration,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the ticker. The first pass runs one interval after start.
    pub fn start(&self, task: Arc<dyn TickTask>) -> Result<()> {
        let mut handle = self.handle.lock();
        if handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return Err(MonitorError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        let interval = self.interval;
        let loop_token = token.clone();

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                // Not raced against cancellation: a started pass always completes
                let report = task.run_tick().await;
                debug!(
                    readings = report.readings_collected,
                    metrics = report.metrics_evaluated,
                    alerts_created = report.alerts_created,
                    duration_ms = report.duration_ms,
                    "Monitoring pass complete"
                );
            }
            debug!("Scheduler loop exited");
        }));
        *self.cancel.lock() = Some(token);

        info!(interval_secs = interval.as_secs_f64(), "Scheduler started");
        Ok(())
    }

    /// Cancel the ticker and wait for any in-flight pass to finish
    pub async fn stop(&self) {
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler task ended abnormally");
            }
            info!("Scheduler stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        started: AtomicUsize,
        finished: AtomicUsize,
        pass_duration: Duration,
    }

    #[async_trait]
    impl TickTask for CountingTask {
        async fn run_tick(&self) -> TickReport {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.pass_duration).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            TickReport::default()
        }
    }

    struct StaticCollector(&'static str, Option<f64>);

    #[async_trait]
    impl MetricCollector for StaticCollector {
        fn name(&self) -> &str {
            self.0
        }

        async fn collect(&self) -> Result<Vec<MetricReading>> {
            match self.1 {
                Some(value) => Ok(vec![MetricReading::new("queue_depth", value, "count")]),
                None => Err(MonitorError::collector(self.0, "unreachable")),
            }
        }
    }

    struct HangingCollector;

    #[async_trait]
    impl MetricCollector for HangingCollector {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn collect(&self) -> Result<Vec<MetricReading>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_stopped() {
        let task = Arc::new(CountingTask {
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            pass_duration: Duration::from_millis(1),
        });
        let scheduler = Scheduler::new(Duration::from_secs(10));
        scheduler.start(task.clone()).unwrap();
        assert!(matches!(scheduler.start(task.clone()), Err(MonitorError::AlreadyRunning)));

        tokio::time::sleep(Duration::from_secs(35)).await;
        scheduler.stop().await;
        let passes = task.finished.load(Ordering::SeqCst);
        assert_eq!(passes, 3);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(task.finished.load(Ordering::SeqCst), passes);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_pass_finish() {
        let task = Arc::new(CountingTask {
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            pass_duration: Duration::from_secs(5),
        });
        let scheduler = Scheduler::new(Duration::from_secs(10));
        scheduler.start(task.clone()).unwrap();

        // Land in the middle of the first pass
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(task.started.load(Ordering::SeqCst), 1);
        assert_eq!(task.finished.load(Ordering::SeqCst), 0);

        scheduler.stop().await;
        assert_eq!(task.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collectors_isolate_failures() {
        let collectors: Vec<Arc<dyn MetricCollector>> = vec![
            Arc::new(StaticCollector("queue", Some(12.0))),
            Arc::new(StaticCollector("broken", None)),
            Arc::new(HangingCollector),
        ];

        let (readings, failures) = collect_readings(&collectors, Duration::from_secs(3)).await;
        assert_eq!(readings, vec![MetricReading::new("queue_depth", 12.0, "count")]);
        assert_eq!(failures, 2);
    }
}
