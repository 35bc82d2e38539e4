//! Static threshold checks

use std::sync::Arc;

use crate::detectors::Detection;
use crate::monitoring::alerts::{AlertManager, AlertSeverity, AlertType, UpsertOutcome};
use crate::samples::{MetricSample, ProfileRegistry, Threshold};

/// Checks samples against their metric's registered threshold
pub struct ThresholdEvaluator {
    profiles: Arc<ProfileRegistry>,
}

impl ThresholdEvaluator {
    pub fn new(profiles: Arc<ProfileRegistry>) -> Self {
        Self { profiles }
    }

    /// Classify a value against a threshold, boundary-inclusive.
    ///
    /// Returns the severity and the boundary that was reached.
    pub fn classify(threshold: &Threshold, value: f64) -> Option<(AlertSeverity, f64)> {
        if value >= threshold.critical {
            Some((AlertSeverity::Critical, threshold.critical))
        } else if value >= threshold.warning {
            Some((AlertSeverity::Warning, threshold.warning))
        } else {
            None
        }
    }

    /// Detection for a sample, `None` when unregistered or within bounds
    pub fn detect(&self, sample: &MetricSample) -> Option<Detection> {
        let threshold = self.profiles.threshold(&sample.name)?;
        let (severity, boundary) = Self::classify(&threshold, sample.value)?;

        let unit = if threshold.unit.is_empty() { &sample.unit } else { &threshold.unit };
        let message = format!(
            "{} is {:.2}{} (>= {} threshold {:.2}{})",
            sample.name,
            sample.value,
            unit,
            severity.as_str().to_lowercase(),
            boundary,
            unit
        );

        Some(
            Detection::new(&sample.name, AlertType::Threshold, severity, sample.value, boundary, message)
                .with_contexts(&sample.context)
                .with_context("warning_threshold", threshold.warning)
                .with_context("critical_threshold", threshold.critical),
        )
    }

    /// Detect and hand the result to the alert manager
    pub fn evaluate(&self, sample: &MetricSample, alerts: &AlertManager) -> Option<UpsertOutcome> {
        self.detect(sample).map(|detection| alerts.upsert(detection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator() -> ThresholdEvaluator {
        let profiles = Arc::new(ProfileRegistry::default());
        profiles.set_threshold("response_time", 2000.0, 5000.0).unwrap();
        ThresholdEvaluator::new(profiles)
    }

    #[test]
    fn test_boundaries_are_inclusive() {
        let threshold = Threshold::new("response_time", 2000.0, 5000.0, "ms").unwrap();

        assert_eq!(ThresholdEvaluator::classify(&threshold, 1999.9), None);
        assert_eq!(
            ThresholdEvaluator::classify(&threshold, 2000.0),
            Some((AlertSeverity::Warning, 2000.0))
        );
        assert_eq!(
            ThresholdEvaluator::classify(&threshold, 5000.0),
            Some((AlertSeverity::Critical, 5000.0))
        );
    }

    #[test]
    fn test_unregistered_metric_is_noop() {
        let evaluator = evaluator();
        let sample = MetricSample::new("other_metric", 1e9, "ms");
        assert!(evaluator.detect(&sample).is_none());
    }

    #[test]
    fn test_detection_carries_context() {
        let evaluator = evaluator();
        let mut context = std::collections::HashMap::new();
        context.insert("endpoint".to_string(), "/chat".to_string());
        let sample = MetricSample::new("response_time", 6000.0, "ms").with_context(context);

        let detection = evaluator.detect(&sample).unwrap();
        assert_eq!(detection.severity, AlertSeverity::Critical);
        assert_eq!(detection.reference, 5000.0);
        assert_eq!(detection.context.get("endpoint").map(String::as_str), Some("/chat"));
        assert!(!detection.recommendations.is_empty());
    }

    #[test]
    fn test_evaluate_dedupes() {
        let evaluator = evaluator();
        let alerts = AlertManager::new();

        for value in [6000.0, 7000.0, 2500.0] {
            evaluator.evaluate(&MetricSample::new("response_time", value, "ms"), &alerts);
        }

        let active = alerts.list_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, AlertSeverity::Critical);
    }
}
