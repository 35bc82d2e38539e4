//! Forward-looking insights projected from metric trends

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::InsightConfig;
use crate::detectors::{Detection, ThresholdEvaluator, TrendAnalyzer, TrendDirection, TrendResult};
use crate::monitoring::alerts::AlertType;
use crate::samples::{MetricStore, ProfileRegistry, Threshold};
use crate::{InsightCategory, TimeWindow};

/// Impact bucket of an insight, from the magnitude of its change rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Medium,
    High,
    Critical,
}

impl ImpactLevel {
    pub fn from_change_rate(change_rate: f64) -> Self {
        let magnitude = change_rate.abs();
        if magnitude > 50.0 {
            ImpactLevel::Critical
        } else if magnitude > 25.0 {
            ImpactLevel::High
        } else {
            ImpactLevel::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
            ImpactLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightRecommendations {
    pub immediate: Vec<String>,
    pub short_term: Vec<String>,
    pub long_term: Vec<String>,
}

/// Projection of one metric over a horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictiveInsight {
    pub id: String,
    pub metric: String,
    pub category: InsightCategory,
    pub direction: TrendDirection,
    pub title: String,
    pub description: String,
    pub current_value: f64,
    pub predicted_value: f64,

    /// Trend change rate, read as percent per hour
    pub change_rate: f64,

    pub confidence: f64,
    pub impact: ImpactLevel,
    pub horizon: TimeWindow,
    pub recommendations: InsightRecommendations,
    pub generated_at: DateTime<Utc>,
}

/// Runs trend analysis over every tracked metric and projects it forward
pub struct PredictiveInsightGenerator {
    config: InsightConfig,
}

impl PredictiveInsightGenerator {
    pub fn new(config: InsightConfig) -> Self {
        Self { config }
    }

    /// Projected value after `horizon`, treating the change rate as hourly
    pub fn project(current: f64, change_rate: f64, horizon: TimeWindow) -> f64 {
        current + (change_rate / 100.0) * current * horizon.hours()
    }

    /// Insights for every metric with enough history and a confident trend
    pub fn generate(
        &self,
        store: &MetricStore,
        profiles: &ProfileRegistry,
        trends: &TrendAnalyzer,
        horizon: TimeWindow,
    ) -> Vec<PredictiveInsight> {
        let mut insights = Vec::new();

        for name in store.metric_names() {
            let history = store.history(&name);
            if history.len() < self.config.min_history {
                continue;
            }
            let Some(trend) = trends.analyze(&name, &history, profiles.polarity(&name)) else {
                continue;
            };
            if let Some(insight) = self.insight_for(&trend, profiles.category(&name), horizon) {
                insights.push(insight);
            }
        }

        insights.sort_by(|a, b| b.impact.cmp(&a.impact).then_with(|| a.metric.cmp(&b.metric)));
        debug!(count = insights.len(), horizon = horizon.as_str(), "Generated predictive insights");
        insights
    }

    /// Build an insight from a trend, `None` when its confidence is too low
    pub fn insight_for(
        &self,
        trend: &TrendResult,
        category: InsightCategory,
        horizon: TimeWindow,
    ) -> Option<PredictiveInsight> {
        if trend.confidence < self.config.min_confidence {
            return None;
        }

        let predicted_value = Self::project(trend.current_value, trend.change_rate, horizon);
        let impact = ImpactLevel::from_change_rate(trend.change_rate);
        let (title, description) = describe(trend, category, predicted_value, horizon);

        Some(PredictiveInsight {
            id: Uuid::new_v4().to_string(),
            metric: trend.metric.clone(),
            category,
            direction: trend.direction,
            title,
            description,
            current_value: trend.current_value,
            predicted_value,
            change_rate: trend.change_rate,
            confidence: trend.confidence,
            impact,
            horizon,
            recommendations: recommendations(&trend.metric, category, trend.direction, impact),
            generated_at: Utc::now(),
        })
    }

    /// Prediction detection when the projected value rises across a
    /// threshold level the current value has not reached
    pub fn detect_breach(insight: &PredictiveInsight, threshold: &Threshold) -> Option<Detection> {
        if insight.predicted_value <= insight.current_value {
            return None;
        }

        let (severity, boundary) = ThresholdEvaluator::classify(threshold, insight.predicted_value)?;
        if let Some((current, _)) = ThresholdEvaluator::classify(threshold, insight.current_value) {
            if current >= severity {
                return None;
            }
        }

        let message = format!(
            "{} is projected to reach {:.2} within {} ({} threshold {:.2})",
            insight.metric,
            insight.predicted_value,
            insight.horizon,
            severity.as_str().to_lowercase(),
            boundary
        );
        Some(
            Detection::new(
                &insight.metric,
                AlertType::Prediction,
                severity,
                insight.predicted_value,
                boundary,
                message,
            )
            .with_context("current_value", format!("{:.3}", insight.current_value))
            .with_context("horizon", insight.horizon)
            .with_context("confidence", format!("{:.3}", insight.confidence)),
        )
    }
}

impl Default for PredictiveInsightGenerator {
    fn default() -> Self {
        Self::new(InsightConfig::default())
    }
}

fn describe(
    trend: &TrendResult,
    category: InsightCategory,
    predicted: f64,
    horizon: TimeWindow,
) -> (String, String) {
    let verb = match trend.direction {
        TrendDirection::Degrading => "degradation",
        TrendDirection::Improving => "improvement",
        TrendDirection::Stable => "drift",
    };
    let title = match category {
        InsightCategory::Performance => format!("Performance {} in {}", verb, trend.metric),
        InsightCategory::Capacity => format!("Capacity {} in {}", verb, trend.metric),
        InsightCategory::Cost => format!("Cost {} in {}", verb, trend.metric),
        InsightCategory::Quality => format!("Quality {} in {}", verb, trend.metric),
    };
    let description = format!(
        "{} is changing at {:+.1}%/h (confidence {:.0}%) and is projected to move from {:.2} to {:.2} over {}",
        trend.metric,
        trend.change_rate,
        trend.confidence * 100.0,
        trend.current_value,
        predicted,
        horizon
    );
    (title, description)
}

fn recommendations(
    metric: &str,
    category: InsightCategory,
    direction: TrendDirection,
    impact: ImpactLevel,
) -> InsightRecommendations {
    match direction {
        TrendDirection::Improving => {
            return InsightRecommendations {
                immediate: Vec::new(),
                short_term: vec![format!("Identify what improved {} and keep it in place", metric)],
                long_term: vec!["Tighten thresholds to lock in the new baseline".to_string()],
            }
        }
        TrendDirection::Stable => {
            return InsightRecommendations {
                immediate: Vec::new(),
                short_term: vec![format!("Keep watching {} for a change in direction", metric)],
                long_term: vec!["Revisit thresholds if the projection holds".to_string()],
            }
        }
        TrendDirection::Degrading => {}
    }

    let mut recs = match category {
        InsightCategory::Performance => InsightRecommendations {
            immediate: vec![format!("Profile the slowest requests contributing to {}", metric)],
            short_term: vec![
                "Add caching for hot paths".to_string(),
                "Review recent deployments for regressions".to_string(),
            ],
            long_term: vec!["Plan architecture work to remove the bottleneck".to_string()],
        },
        InsightCategory::Capacity => InsightRecommendations {
            immediate: vec![format!("Check headroom for {}", metric)],
            short_term: vec!["Scale out the affected component".to_string()],
            long_term: vec!["Set up capacity planning with growth projections".to_string()],
        },
        InsightCategory::Cost => InsightRecommendations {
            immediate: vec![format!("Review the operations driving {}", metric)],
            short_term: vec![
                "Route low-value requests to cheaper models".to_string(),
                "Cache repeated results".to_string(),
            ],
            long_term: vec!["Introduce per-organization budgets and usage alerts".to_string()],
        },
        InsightCategory::Quality => InsightRecommendations {
            immediate: vec![format!("Inspect recent failures behind {}", metric)],
            short_term: vec!["Add retries and fallbacks for the failing dependency".to_string()],
            long_term: vec!["Expand test coverage around the failing paths".to_string()],
        },
    };

    if impact == ImpactLevel::Critical {
        recs.immediate.insert(0, "Escalate to the on-call engineer".to_string());
    }
    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::alerts::AlertSeverity;
    use crate::samples::MetricSample;
    use crate::Polarity;

    fn fill(store: &MetricStore, name: &str, values: impl IntoIterator<Item = f64>) {
        let start = Utc::now() - chrono::Duration::hours(1);
        for (i, value) in values.into_iter().enumerate() {
            store.append(MetricSample::new(name, value, "ms").at(start + chrono::Duration::minutes(i as i64)));
        }
    }

    #[test]
    fn test_impact_levels() {
        assert_eq!(ImpactLevel::from_change_rate(10.0), ImpactLevel::Medium);
        assert_eq!(ImpactLevel::from_change_rate(-30.0), ImpactLevel::High);
        assert_eq!(ImpactLevel::from_change_rate(60.0), ImpactLevel::Critical);
    }

    #[test]
    fn test_projection_uses_hourly_multiplier() {
        assert_eq!(PredictiveInsightGenerator::project(100.0, 10.0, TimeWindow::OneHour), 110.0);
        assert_eq!(PredictiveInsightGenerator::project(100.0, 10.0, TimeWindow::OneDay), 340.0);
    }

    #[test]
    fn test_generate_skips_short_and_low_confidence_histories() {
        let store = MetricStore::new(1000, std::time::Duration::from_secs(86400));
        let profiles = ProfileRegistry::new(Polarity::HigherIsWorse);
        let trends = TrendAnalyzer::default();

        fill(&store, "short", (0..9).map(|v| v as f64 * 100.0));
        fill(&store, "flat", std::iter::repeat(50.0).take(20));
        fill(&store, "rising", (0..20).map(|v| 100.0 + 50.0 * v as f64));
        // Upward slope of about 6% per step, but R² near 0.1
        fill(&store, "noisy", [100.0, 300.0, 80.0, 320.0, 110.0, 340.0, 100.0, 360.0, 120.0, 380.0]);

        let noisy = trends
            .analyze("noisy", &store.history("noisy"), Polarity::HigherIsWorse)
            .unwrap();
        assert_eq!(noisy.direction, TrendDirection::Degrading);
        assert!(noisy.confidence < 0.6);

        let insights =
            PredictiveInsightGenerator::default().generate(&store, &profiles, &trends, TimeWindow::OneDay);
        let metrics: Vec<&str> = insights.iter().map(|i| i.metric.as_str()).collect();

        assert_eq!(insights.len(), 2);
        assert!(metrics.contains(&"flat"));
        assert!(metrics.contains(&"rising"));

        let rising = insights.iter().find(|i| i.metric == "rising").unwrap();
        assert_eq!(rising.direction, TrendDirection::Degrading);
        assert!(rising.predicted_value > rising.current_value);
        assert!(!rising.recommendations.immediate.is_empty());

        let flat = insights.iter().find(|i| i.metric == "flat").unwrap();
        assert_eq!(flat.direction, TrendDirection::Stable);
        assert_eq!(flat.predicted_value, flat.current_value);
    }

    #[test]
    fn test_stable_trend_still_projects_over_long_horizon() {
        let store = MetricStore::new(1000, std::time::Duration::from_secs(86400));
        let profiles = ProfileRegistry::new(Polarity::HigherIsWorse);
        let trends = TrendAnalyzer::default();

        // 3 per step on a mean of 113.5 stays inside the stable band
        fill(&store, "queue_wait", (0..10).map(|v| 100.0 + 3.0 * v as f64));

        let insights =
            PredictiveInsightGenerator::default().generate(&store, &profiles, &trends, TimeWindow::OneMonth);

        assert_eq!(insights.len(), 1);
        let insight = &insights[0];
        assert_eq!(insight.direction, TrendDirection::Stable);
        assert_eq!(insight.current_value, 127.0);
        assert!((insight.predicted_value - 2543.916).abs() < 0.01);
        assert!(insight.recommendations.immediate.is_empty());
        assert!(!insight.recommendations.short_term.is_empty());

        let threshold = Threshold::new("queue_wait", 500.0, 2000.0, "ms").unwrap();
        let detection = PredictiveInsightGenerator::detect_breach(insight, &threshold).unwrap();
        assert_eq!(detection.severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_breach_detection() {
        let store = MetricStore::new(1000, std::time::Duration::from_secs(86400));
        let profiles = ProfileRegistry::new(Polarity::HigherIsWorse);
        fill(&store, "latency", (0..10).map(|v| 1000.0 + 100.0 * v as f64));

        let insights = PredictiveInsightGenerator::default().generate(
            &store,
            &profiles,
            &TrendAnalyzer::default(),
            TimeWindow::OneDay,
        );
        let threshold = Threshold::new("latency", 2000.0, 5000.0, "ms").unwrap();
        let detection = PredictiveInsightGenerator::detect_breach(&insights[0], &threshold).unwrap();

        assert_eq!(detection.alert_type, AlertType::Prediction);
        assert_eq!(detection.metric, "latency");

        let already_breached = Threshold::new("latency", 100.0, 200.0, "ms").unwrap();
        assert!(PredictiveInsightGenerator::detect_breach(&insights[0], &already_breached).is_none());
    }
}
