//! Detectors that turn metric history into alert candidates
//!
//! - [`ThresholdEvaluator`]: static warning/critical boundaries
//! - [`AnomalyDetector`]: z-score of recent samples against a baseline
//! - [`TrendAnalyzer`]: least-squares slope and confidence over a recent window

pub mod anomaly;
pub mod stats;
pub mod threshold;
pub mod trend;

pub use anomaly::{AnomalyDetector, AnomalyScore};
pub use threshold::ThresholdEvaluator;
pub use trend::{TrendAnalyzer, TrendDirection, TrendResult};

use std::collections::HashMap;

use crate::monitoring::alerts::{AlertSeverity, AlertType};

/// A detector firing, handed to the alert manager for dedup and creation
#[derive(Debug, Clone)]
pub struct Detection {
    pub metric: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,

    /// Value that triggered the detection
    pub value: f64,

    /// Threshold or baseline the value was compared against
    pub reference: f64,

    pub message: String,
    pub context: HashMap<String, String>,
    pub recommendations: Vec<String>,
}

impl Detection {
    pub fn new(
        metric: impl Into<String>,
        alert_type: AlertType,
        severity: AlertSeverity,
        value: f64,
        reference: f64,
        message: impl Into<String>,
    ) -> Self {
        let metric = metric.into();
        let recommendations = default_recommendations(&metric, alert_type, severity);
        Self {
            metric,
            alert_type,
            severity,
            value,
            reference,
            message: message.into(),
            context: HashMap::new(),
            recommendations,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn with_contexts(mut self, context: &HashMap<String, String>) -> Self {
        for (key, value) in context {
            self.context.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self
    }
}

/// Templated follow-up actions per alert type
pub fn default_recommendations(
    metric: &str,
    alert_type: AlertType,
    severity: AlertSeverity,
) -> Vec<String> {
    let mut recommendations = match alert_type {
        AlertType::Threshold => vec![
            format!("Check recent deployments or load changes affecting {}", metric),
            format!("Review the configured limits for {}", metric),
        ],
        AlertType::Anomaly => vec![
            format!("Correlate the {} deviation with recent incidents or traffic spikes", metric),
            "Verify upstream dependencies are responding normally".to_string(),
        ],
        AlertType::Trend => vec![
            format!("{} is degrading steadily; schedule a capacity or performance review", metric),
            "Profile the slowest operations before the trend reaches a threshold".to_string(),
        ],
        AlertType::Prediction => vec![
            format!("{} is projected to breach its limit; plan mitigation now", metric),
        ],
    };

    if severity == AlertSeverity::Critical {
        recommendations.insert(0, "Escalate to the on-call engineer".to_string());
    }
    recommendations
}
