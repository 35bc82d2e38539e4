//! Bounded, time-ordered per-metric sample history

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::debug;

use crate::config::StoreConfig;
use crate::detectors::stats;
use crate::samples::{MetricSample, Tags};

/// Filter for [`MetricStore::query`]
#[derive(Debug, Clone, Default)]
pub struct MetricQuery {
    /// Restrict to one metric
    pub name: Option<String>,

    /// Only samples at or after this instant
    pub since: Option<DateTime<Utc>>,

    /// Only samples carrying all of these tags
    pub tags: Tags,
}

impl MetricQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    fn matches(&self, sample: &MetricSample) -> bool {
        self.since.map_or(true, |since| sample.timestamp >= since) && sample.matches_tags(&self.tags)
    }
}

/// Descriptive statistics over a slice of a metric's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSummary {
    pub name: String,
    pub unit: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p95: f64,
    pub latest: f64,
    pub latest_at: DateTime<Utc>,
}

/// In-memory sample history keyed by metric name.
///
/// Each history is ordered by timestamp and bounded by `capacity` (oldest
/// samples evicted first). Age-based expiry happens in [`purge_expired`],
/// which the scheduler calls on every tick.
///
/// [`purge_expired`]: MetricStore::purge_expired
pub struct MetricStore {
    histories: RwLock<HashMap<String, VecDeque<MetricSample>>>,
    capacity: usize,
    max_age: Duration,
}

impl MetricStore {
    /// Create a new store
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            max_age,
        }
    }

    /// Create a store from configuration
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.capacity, config.max_age())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Append a sample, keeping the history time-ordered.
    ///
    /// Returns the history length after the append.
    pub fn append(&self, sample: MetricSample) -> usize {
        let mut histories = self.histories.write();
        let history = histories
            .entry(sample.name.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity.min(64)));

        match history.back() {
            Some(last) if last.timestamp > sample.timestamp => {
                let position = history.partition_point(|s| s.timestamp <= sample.timestamp);
                debug!(metric = %sample.name, position, "Inserting out-of-order sample");
                history.insert(position, sample);
            }
            _ => history.push_back(sample),
        }

        while history.len() > self.capacity {
            history.pop_front();
        }

        history.len()
    }

    /// Full history of one metric, oldest first
    pub fn history(&self, name: &str) -> Vec<MetricSample> {
        self.histories
            .read()
            .get(name)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Most recent `n` samples of one metric, oldest first
    pub fn recent(&self, name: &str, n: usize) -> Vec<MetricSample> {
        self.histories
            .read()
            .get(name)
            .map(|h| h.iter().skip(h.len().saturating_sub(n)).cloned().collect())
            .unwrap_or_default()
    }

    /// Values of one metric, oldest first
    pub fn values(&self, name: &str) -> Vec<f64> {
        self.histories
            .read()
            .get(name)
            .map(|h| h.iter().map(|s| s.value).collect())
            .unwrap_or_default()
    }

    /// Latest sample of a metric
    pub fn latest(&self, name: &str) -> Option<MetricSample> {
        self.histories.read().get(name).and_then(|h| h.back().cloned())
    }

    /// Number of samples held for a metric
    pub fn len(&self, name: &str) -> usize {
        self.histories.read().get(name).map_or(0, VecDeque::len)
    }

    /// True when no samples are held at all
    pub fn is_empty(&self) -> bool {
        self.histories.read().values().all(VecDeque::is_empty)
    }

    /// Names of all tracked metrics, sorted
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.histories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Filtered, time-ordered samples
    pub fn query(&self, query: &MetricQuery) -> Vec<MetricSample> {
        let histories = self.histories.read();

        match &query.name {
            Some(name) => histories
                .get(name)
                .map(|h| h.iter().filter(|s| query.matches(s)).cloned().collect())
                .unwrap_or_default(),
            None => {
                let mut samples: Vec<MetricSample> = histories
                    .values()
                    .flat_map(|h| h.iter().filter(|s| query.matches(s)).cloned())
                    .collect();
                samples.sort_by_key(|s| s.timestamp);
                samples
            }
        }
    }

    /// Summary statistics for a metric since an instant
    pub fn summary(&self, name: &str, since: Option<DateTime<Utc>>) -> Option<MetricSummary> {
        let mut query = MetricQuery::new().name(name);
        query.since = since;
        let samples = self.query(&query);
        let last = samples.last()?;
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();

        Some(MetricSummary {
            name: name.to_string(),
            unit: last.unit.clone(),
            count: values.len(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg: stats::mean(&values).unwrap_or(0.0),
            p95: stats::percentile(&values, 95).unwrap_or(0.0),
            latest: last.value,
            latest_at: last.timestamp,
        })
    }

    /// Drop samples older than `max_age`, and histories left empty.
    ///
    /// Returns the number of samples removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = match chrono::Duration::from_std(self.max_age)
            .ok()
            .and_then(|max_age| now.checked_sub_signed(max_age))
        {
            Some(cutoff) => cutoff,
            None => return 0,
        };

        let mut histories = self.histories.write();
        let mut removed = 0;

        for history in histories.values_mut() {
            while history.front().map_or(false, |s| s.timestamp < cutoff) {
                history.pop_front();
                removed += 1;
            }
        }
        histories.retain(|_, h| !h.is_empty());

        if removed > 0 {
            debug!(removed, "Purged expired samples");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_at(name: &str, value: f64, offset_secs: i64) -> MetricSample {
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        MetricSample::new(name, value, "ms").at(base + chrono::Duration::seconds(offset_secs))
    }

    #[test]
    fn test_capacity_eviction_is_fifo() {
        let store = MetricStore::new(3, Duration::from_secs(3600));
        for i in 0..5 {
            store.append(sample_at("latency", i as f64, i));
        }

        assert_eq!(store.len("latency"), 3);
        assert_eq!(store.values("latency"), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_out_of_order_insert_keeps_order() {
        let store = MetricStore::new(10, Duration::from_secs(3600));
        store.append(sample_at("latency", 1.0, 10));
        store.append(sample_at("latency", 2.0, 30));
        store.append(sample_at("latency", 3.0, 20));

        assert_eq!(store.values("latency"), vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_query_filters() {
        let store = MetricStore::new(10, Duration::from_secs(3600));
        store.append(sample_at("api", 1.0, 0).with_tag("endpoint", "/a"));
        store.append(sample_at("api", 2.0, 10).with_tag("endpoint", "/b"));
        store.append(sample_at("db", 3.0, 5));

        let all = store.query(&MetricQuery::new());
        assert_eq!(all.iter().map(|s| s.value).collect::<Vec<_>>(), vec![1.0, 3.0, 2.0]);

        let tagged = store.query(&MetricQuery::new().tag("endpoint", "/b"));
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].value, 2.0);

        let since = sample_at("x", 0.0, 5).timestamp;
        let recent = store.query(&MetricQuery::new().name("api").since(since));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let store = MetricStore::new(10, Duration::from_secs(60));
        store.append(sample_at("old", 1.0, 0));
        store.append(sample_at("mixed", 1.0, 0));
        store.append(sample_at("mixed", 2.0, 100));

        let now = sample_at("x", 0.0, 120).timestamp;
        assert_eq!(store.purge_expired(now), 2);
        assert_eq!(store.metric_names(), vec!["mixed".to_string()]);
        assert_eq!(store.values("mixed"), vec![2.0]);
    }

    #[test]
    fn test_summary() {
        let store = MetricStore::new(100, Duration::from_secs(3600));
        for (i, v) in [10.0, 20.0, 30.0, 40.0].iter().enumerate() {
            store.append(sample_at("latency", *v, i as i64));
        }

        let summary = store.summary("latency", None).unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.max, 40.0);
        assert_eq!(summary.avg, 25.0);
        assert_eq!(summary.latest, 40.0);
        assert!(summary.p95 >= 30.0 && summary.p95 <= 40.0);
        assert!(store.summary("missing", None).is_none());
    }

    proptest! {
        #[test]
        fn prop_history_stays_time_ordered(offsets in proptest::collection::vec(0i64..10_000, 1..200)) {
            let store = MetricStore::new(50, Duration::from_secs(86_400));
            for (i, offset) in offsets.iter().enumerate() {
                store.append(sample_at("m", i as f64, *offset));
            }

            let history = store.history("m");
            prop_assert!(history.len() <= 50);
            prop_assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }
}
