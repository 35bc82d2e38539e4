//! Prometheus text exposition and JSON dashboard snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::monitoring::alerts::AlertStats;
use crate::monitoring::health::HealthStatus;
use crate::samples::{names, tags, MetricQuery, MetricSample, MetricStore, MetricSummary};
use crate::{TimeWindow, VERSION};

/// Prometheus-compatible name for a metric
pub fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if out.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Render `_avg` and `_p95` gauges for every metric with samples since `since`.
///
/// Each line carries the epoch-millisecond timestamp of the metric's latest sample.
pub fn prometheus_text(store: &MetricStore, since: DateTime<Utc>) -> String {
    let mut output = String::new();

    for name in store.metric_names() {
        let Some(summary) = store.summary(&name, Some(since)) else {
            continue;
        };
        let base = sanitize_name(&name);
        let timestamp = summary.latest_at.timestamp_millis();

        for (suffix, label, value) in [("avg", "Average", summary.avg), ("p95", "95th percentile", summary.p95)] {
            let metric = format!("{}_{}", base, suffix);
            let _ = writeln!(output, "# HELP {} {} of {} ({})", metric, label, name, summary.unit);
            let _ = writeln!(output, "# TYPE {} gauge", metric);
            let _ = writeln!(output, "{} {} {}", metric, value, timestamp);
        }
    }

    output
}

/// API and database activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationsSection {
    pub api_response_time: Option<MetricSummary>,
    pub api_errors: usize,
    pub requests_by_endpoint: BTreeMap<String, usize>,
    pub db_query_duration: Option<MetricSummary>,
    pub queries_by_table: BTreeMap<String, usize>,
}

/// AI operation activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiSection {
    pub duration: Option<MetricSummary>,
    pub operations: usize,
    pub success_rate: Option<f64>,
    pub total_tokens: f64,
    pub total_cost_usd: f64,
    pub operations_by_model: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorsSection {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSection {
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: Option<f64>,
}

/// Engine-wide state supplied by the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSection {
    pub status: HealthStatus,
    pub health_score: f64,
    pub alerts: AlertStats,
    pub tracked_metrics: usize,
    pub uptime_secs: u64,
}

/// Dashboard view of the recent window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub system_name: String,
    pub version: String,
    pub window: TimeWindow,
    pub generated_at: DateTime<Utc>,
    pub operations: OperationsSection,
    pub ai: AiSection,
    pub errors: ErrorsSection,
    pub cache: CacheSection,
    pub system: SystemSection,
}

impl DashboardSnapshot {
    /// Build a snapshot from the samples recorded within `window` before `now`
    pub fn build(
        instance_name: &str,
        store: &MetricStore,
        window: TimeWindow,
        now: DateTime<Utc>,
        system: SystemSection,
    ) -> Self {
        let since = now - window.duration();
        let samples = |name: &str| store.query(&MetricQuery::new().name(name).since(since));

        let api = samples(names::API_RESPONSE_TIME);
        let db = samples(names::DB_QUERY_DURATION);
        let operations = OperationsSection {
            api_response_time: store.summary(names::API_RESPONSE_TIME, Some(since)),
            api_errors: samples(names::API_ERRORS).len(),
            requests_by_endpoint: count_by_tag(&api, tags::ENDPOINT),
            db_query_duration: store.summary(names::DB_QUERY_DURATION, Some(since)),
            queries_by_table: count_by_tag(&db, tags::TABLE),
        };

        let ai_durations = samples(names::AI_OPERATION_DURATION);
        let succeeded = ai_durations
            .iter()
            .filter(|s| s.tag(tags::SUCCESS) == Some("true"))
            .count();
        let ai = AiSection {
            duration: store.summary(names::AI_OPERATION_DURATION, Some(since)),
            operations: ai_durations.len(),
            success_rate: ratio(succeeded, ai_durations.len()),
            total_tokens: samples(names::AI_TOKENS_USED).iter().map(|s| s.value).sum(),
            total_cost_usd: samples(names::AI_OPERATION_COST).iter().map(|s| s.value).sum(),
            operations_by_model: count_by_tag(&ai_durations, tags::MODEL),
        };

        let error_samples = samples(names::ERRORS);
        let errors = ErrorsSection {
            total: error_samples.len(),
            by_kind: count_by_tag(&error_samples, tags::KIND),
        };

        let cache_samples = samples(names::CACHE_HIT);
        let hits = cache_samples.iter().filter(|s| s.value > 0.0).count();
        let cache = CacheSection {
            hits,
            misses: cache_samples.len() - hits,
            hit_rate: ratio(hits, cache_samples.len()),
        };

        Self {
            system_name: instance_name.to_string(),
            version: VERSION.to_string(),
            window,
            generated_at: now,
            operations,
            ai,
            errors,
            cache,
            system,
        }
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn count_by_tag(samples: &[MetricSample], key: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for value in samples.iter().filter_map(|s| s.tag(key)) {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    counts
}

fn ratio(part: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| part as f64 / total as f64)
}
