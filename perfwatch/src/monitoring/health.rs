//! Per-component and system-wide health scoring
//!
//! Each registered component supplies a [`ProbeReading`] through a
//! [`HealthProbe`]. A reading starts at 100 and loses the penalty of every
//! [`ScoreRule`] it violates. The system score is the mean of component
//! scores, not the worst case.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::HealthConfig;
use crate::monitoring::alerts::{Alert, AlertManager};
use crate::{MonitorError, Result};

/// Health status tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Score >= 80
    Healthy,

    /// Score in [60, 80)
    Degraded,

    /// Score < 60
    Unhealthy,

    /// Nothing to score
    Unknown,
}

impl HealthStatus {
    /// Status tier for a score
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            HealthStatus::Healthy
        } else if score >= 60.0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Check if the status is operational (Healthy or Degraded)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

/// Recent-window figures reported by a component probe
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProbeReading {
    pub latency_ms: f64,

    /// Percentage of failed operations
    pub error_rate: f64,

    /// Operations per second
    pub throughput: f64,

    /// Percentage of successful availability checks
    pub availability: f64,
}

impl ProbeReading {
    fn signal(&self, signal: HealthSignal) -> f64 {
        match signal {
            HealthSignal::LatencyMs => self.latency_ms,
            HealthSignal::ErrorRate => self.error_rate,
            HealthSignal::Throughput => self.throughput,
            HealthSignal::Availability => self.availability,
        }
    }
}

/// Health check for a single component
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<ProbeReading>;
}

/// Reading field a rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthSignal {
    LatencyMs,
    ErrorRate,
    Throughput,
    Availability,
}

/// Comparison operators for score rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl ComparisonOperator {
    /// Evaluate the comparison
    pub fn evaluate(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThan => value > threshold,
            ComparisonOperator::GreaterThanOrEqual => value >= threshold,
            ComparisonOperator::LessThan => value < threshold,
            ComparisonOperator::LessThanOrEqual => value <= threshold,
        }
    }

    /// Get the operator as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "<=",
        }
    }
}

/// A (predicate, penalty) pair applied to component readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRule {
    pub name: String,
    pub signal: HealthSignal,
    pub operator: ComparisonOperator,
    pub threshold: f64,

    /// Points subtracted from 100 when the predicate holds
    pub penalty: f64,

    #[serde(default)]
    pub recommendation: Option<String>,
}

impl ScoreRule {
    pub fn new(
        name: impl Into<String>,
        signal: HealthSignal,
        operator: ComparisonOperator,
        threshold: f64,
        penalty: f64,
    ) -> Self {
        Self {
            name: name.into(),
            signal,
            operator,
            threshold,
            penalty,
            recommendation: None,
        }
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    /// True when the reading violates this rule
    pub fn violated_by(&self, reading: &ProbeReading) -> bool {
        self.operator.evaluate(reading.signal(self.signal), self.threshold)
    }

    /// Default rule set
    pub fn defaults() -> Vec<ScoreRule> {
        vec![
            ScoreRule::new(
                "high_latency",
                HealthSignal::LatencyMs,
                ComparisonOperator::GreaterThan,
                2000.0,
                20.0,
            )
            .with_recommendation("Investigate slow operations and add caching where possible"),
            ScoreRule::new(
                "high_error_rate",
                HealthSignal::ErrorRate,
                ComparisonOperator::GreaterThan,
                5.0,
                30.0,
            )
            .with_recommendation("Review recent errors and add retries for transient failures"),
            ScoreRule::new(
                "low_throughput",
                HealthSignal::Throughput,
                ComparisonOperator::LessThan,
                1.0,
                15.0,
            )
            .with_recommendation("Check for stalled workers or exhausted connection pools"),
            ScoreRule::new(
                "low_availability",
                HealthSignal::Availability,
                ComparisonOperator::LessThan,
                95.0,
                25.0,
            )
            .with_recommendation("Verify the component's dependencies are reachable"),
        ]
    }
}

/// Health of a single component, recomputed on every query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,

    /// Score in [0, 100]
    pub score: f64,

    /// Last reading, absent when the probe failed
    pub reading: Option<ProbeReading>,

    /// Names of the rules the reading violated
    pub violations: Vec<String>,

    /// Probe failure, if any
    pub message: Option<String>,

    pub response_time_ms: f64,
    pub last_checked: DateTime<Utc>,
}

impl ComponentHealth {
    fn failed(name: &str, message: String, response_time_ms: f64) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Unhealthy,
            score: 0.0,
            reading: None,
            violations: Vec::new(),
            message: Some(message),
            response_time_ms,
            last_checked: Utc::now(),
        }
    }
}

/// Aggregated health report for the whole system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,

    /// Mean of component scores
    pub score: f64,

    pub components: Vec<ComponentHealth>,

    /// Unresolved critical alerts at the time of the check
    pub critical_alerts: Vec<Alert>,

    pub recommendations: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// Scores registered components and aggregates them
pub struct HealthAggregator {
    probes: RwLock<BTreeMap<String, Arc<dyn HealthProbe>>>,
    rules: RwLock<Vec<ScoreRule>>,
    probe_timeout: Duration,
    attention_score: f64,
}

impl HealthAggregator {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            probes: RwLock::new(BTreeMap::new()),
            rules: RwLock::new(config.rules.clone()),
            probe_timeout: config.probe_timeout(),
            attention_score: config.attention_score,
        }
    }

    /// Register or replace a component probe
    pub fn register_probe(&self, name: impl Into<String>, probe: Arc<dyn HealthProbe>) {
        let name = name.into();
        debug!(component = %name, "Registered health probe");
        self.probes.write().insert(name, probe);
    }

    /// Remove a component probe
    pub fn unregister(&self, name: &str) -> bool {
        self.probes.write().remove(name).is_some()
    }

    /// Registered component names
    pub fn components(&self) -> Vec<String> {
        self.probes.read().keys().cloned().collect()
    }

    /// Replace the score rules
    pub fn set_rules(&self, rules: Vec<ScoreRule>) {
        *self.rules.write() = rules;
    }

    /// Score a reading against the rule set. Returns the clamped score and
    /// the violated rules.
    pub fn score_reading(&self, reading: &ProbeReading) -> (f64, Vec<ScoreRule>) {
        let violated: Vec<ScoreRule> = self
            .rules
            .read()
            .iter()
            .filter(|rule| rule.violated_by(reading))
            .cloned()
            .collect();
        let penalty: f64 = violated.iter().map(|rule| rule.penalty).sum();
        ((100.0 - penalty).clamp(0.0, 100.0), violated)
    }

    /// Run one probe with the configured timeout
    pub async fn check_component(&self, name: &str, probe: &dyn HealthProbe) -> ComponentHealth {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.probe_timeout, probe.check()).await;
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let reading = match outcome {
            Ok(Ok(reading)) => reading,
            Ok(Err(e)) => {
                warn!(component = %name, error = %e, "Health probe failed");
                return ComponentHealth::failed(name, e.to_string(), response_time_ms);
            }
            Err(_) => {
                let e = MonitorError::ProbeTimeout {
                    component: name.to_string(),
                    timeout_ms: self.probe_timeout.as_millis() as u64,
                };
                warn!(component = %name, "{}", e);
                return ComponentHealth::failed(name, e.to_string(), response_time_ms);
            }
        };

        let (score, violated) = self.score_reading(&reading);
        ComponentHealth {
            name: name.to_string(),
            status: HealthStatus::from_score(score),
            score,
            reading: Some(reading),
            violations: violated.into_iter().map(|rule| rule.name).collect(),
            message: None,
            response_time_ms,
            last_checked: Utc::now(),
        }
    }

    /// Check every registered component concurrently
    pub async fn check_components(&self) -> Vec<ComponentHealth> {
        let probes: Vec<(String, Arc<dyn HealthProbe>)> = self
            .probes
            .read()
            .iter()
            .map(|(name, probe)| (name.clone(), Arc::clone(probe)))
            .collect();

        futures::future::join_all(
            probes
                .iter()
                .map(|(name, probe)| self.check_component(name, probe.as_ref())),
        )
        .await
    }

    /// Combine component results into a system report
    pub fn aggregate(&self, components: Vec<ComponentHealth>, critical_alerts: Vec<Alert>) -> SystemHealth {
        let mut recommendations = Vec::new();

        let (status, score) = if components.is_empty() {
            recommendations.push("No health probes registered".to_string());
            (HealthStatus::Unknown, 0.0)
        } else {
            let score = (components.iter().map(|c| c.score).sum::<f64>() / components.len() as f64)
                .clamp(0.0, 100.0);
            if score < self.attention_score {
                recommendations.push(format!(
                    "System health score {:.1} requires immediate attention",
                    score
                ));
            }
            (HealthStatus::from_score(score), score)
        };

        let rules = self.rules.read();
        for component in &components {
            if let Some(message) = &component.message {
                recommendations.push(format!("{}: health check failed ({})", component.name, message));
            }
            for violation in &component.violations {
                let advice = rules
                    .iter()
                    .find(|rule| &rule.name == violation)
                    .and_then(|rule| rule.recommendation.as_deref());
                if let Some(advice) = advice {
                    recommendations.push(format!("{}: {}", component.name, advice));
                }
            }
        }

        if !critical_alerts.is_empty() {
            recommendations.push(format!(
                "Resolve {} critical alert(s) before they impact users",
                critical_alerts.len()
            ));
        }

        SystemHealth {
            status,
            score,
            components,
            critical_alerts,
            recommendations,
            checked_at: Utc::now(),
        }
    }

    /// Check all components and attach unresolved critical alerts
    pub async fn system_health(&self, alerts: &AlertManager) -> SystemHealth {
        let components = self.check_components().await;
        let health = self.aggregate(components, alerts.critical_active());

        metrics::gauge!("perfwatch_system_health_score", health.score);
        debug!(
            status = health.status.as_str(),
            score = health.score,
            components = health.components.len(),
            "System health computed"
        );
        health
    }
}

impl Default for HealthAggregator {
    fn default() -> Self {
        Self::new(&HealthConfig::default())
    }
}
