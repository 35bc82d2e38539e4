//! Z-score anomaly detection

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnomalyConfig;
use crate::detectors::{stats, Detection};
use crate::monitoring::alerts::{AlertManager, AlertSeverity, AlertType, UpsertOutcome};
use crate::samples::MetricSample;

/// Deviation of the recent window from the baseline window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub recent_avg: f64,
    pub baseline_avg: f64,
    pub baseline_std_dev: f64,

    /// Std-dev actually divided by (the baseline std-dev or its floor)
    pub effective_std_dev: f64,
    pub z_score: f64,
}

/// Compares the mean of the last `recent_window` samples against the
/// `baseline_window` samples preceding them.
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Score a value history, `None` when too short or not scorable.
    ///
    /// A zero baseline std-dev is floored at `min_std_dev_ratio * |baseline mean|`
    /// when the recent mean has moved; an unmoved or zero-floor series has no score.
    pub fn score(&self, values: &[f64]) -> Option<AnomalyScore> {
        let required = self.config.recent_window + self.config.baseline_window;
        if values.len() < self.config.min_history.max(required) {
            return None;
        }

        let recent_start = values.len() - self.config.recent_window;
        let baseline_start = recent_start - self.config.baseline_window;
        let recent = &values[recent_start..];
        let baseline = &values[baseline_start..recent_start];

        let recent_avg = stats::mean(recent)?;
        let baseline_avg = stats::mean(baseline)?;
        let baseline_std_dev = stats::population_std_dev(baseline)?;
        let deviation = (recent_avg - baseline_avg).abs();

        let effective_std_dev = if baseline_std_dev > f64::EPSILON {
            baseline_std_dev
        } else if deviation <= f64::EPSILON {
            return None;
        } else {
            self.config.min_std_dev_ratio * baseline_avg.abs()
        };
        if effective_std_dev <= f64::EPSILON {
            return None;
        }

        Some(AnomalyScore {
            recent_avg,
            baseline_avg,
            baseline_std_dev,
            effective_std_dev,
            z_score: deviation / effective_std_dev,
        })
    }

    /// Severity for a z-score
    pub fn classify(&self, z_score: f64) -> Option<AlertSeverity> {
        if z_score > self.config.critical_z {
            Some(AlertSeverity::Critical)
        } else if z_score > self.config.warning_z {
            Some(AlertSeverity::Warning)
        } else {
            None
        }
    }

    /// Detection for a metric history (oldest first)
    pub fn detect(&self, name: &str, history: &[MetricSample]) -> Option<Detection> {
        let values: Vec<f64> = history.iter().map(|s| s.value).collect();
        let score = self.score(&values)?;
        let severity = self.classify(score.z_score)?;

        debug!(metric = name, z_score = score.z_score, "Anomaly detected");

        let message = format!(
            "{} recent average {:.2} deviates from baseline {:.2} (z-score {:.1})",
            name, score.recent_avg, score.baseline_avg, score.z_score
        );
        let mut detection = Detection::new(
            name,
            AlertType::Anomaly,
            severity,
            score.recent_avg,
            score.baseline_avg,
            message,
        )
        .with_context("z_score", format!("{:.3}", score.z_score))
        .with_context("baseline_std_dev", format!("{:.3}", score.baseline_std_dev));

        if let Some(last) = history.last() {
            detection = detection.with_contexts(&last.context);
        }
        Some(detection)
    }

    /// Detect and hand the result to the alert manager
    pub fn evaluate(
        &self,
        name: &str,
        history: &[MetricSample],
        alerts: &AlertManager,
    ) -> Option<UpsertOutcome> {
        self.detect(name, history).map(|detection| alerts.upsert(detection))
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(AnomalyConfig::default())
    }
}
