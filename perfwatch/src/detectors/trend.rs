//! Linear-regression trend analysis

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{RegressionAxis, TrendConfig};
use crate::detectors::{stats, Detection};
use crate::monitoring::alerts::{AlertManager, AlertSeverity, AlertType, UpsertOutcome};
use crate::samples::MetricSample;
use crate::{Polarity, TimeWindow};

/// Direction of a metric relative to its polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Degrading,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Degrading => "degrading",
            TrendDirection::Stable => "stable",
        }
    }
}

/// Fitted trend over a metric's recent window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendResult {
    pub metric: String,
    pub direction: TrendDirection,
    pub polarity: Polarity,

    /// Change per regression step
    pub slope: f64,

    /// Slope as a percentage of the window mean
    pub change_rate: f64,

    /// R² of the fit, in [0, 1]
    pub confidence: f64,

    pub window_mean: f64,
    pub current_value: f64,

    /// One step ahead of the latest sample
    pub projected_value: f64,

    pub sample_count: usize,
    pub timeframe: Option<TimeWindow>,
    pub analyzed_at: DateTime<Utc>,
}

/// Fits a least-squares line through the most recent samples of a metric
pub struct TrendAnalyzer {
    config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Analyze the tail of a history (oldest first)
    pub fn analyze(
        &self,
        name: &str,
        history: &[MetricSample],
        polarity: Polarity,
    ) -> Option<TrendResult> {
        if history.len() < self.config.min_samples.max(2) {
            return None;
        }

        let window = &history[history.len().saturating_sub(self.config.window)..];
        let ys: Vec<f64> = window.iter().map(|s| s.value).collect();
        let xs = self.regression_axis(window);
        let fit = stats::linear_fit(&xs, &ys)?;

        let window_mean = stats::mean(&ys)?;
        let change_rate = if window_mean.abs() > f64::EPSILON {
            fit.slope / window_mean * 100.0
        } else {
            0.0
        };
        let current_value = *ys.last()?;

        Some(TrendResult {
            metric: name.to_string(),
            direction: self.classify(change_rate, fit.slope, polarity),
            polarity,
            slope: fit.slope,
            change_rate,
            confidence: fit.r_squared.clamp(0.0, 1.0),
            window_mean,
            current_value,
            projected_value: current_value + fit.slope,
            sample_count: window.len(),
            timeframe: None,
            analyzed_at: Utc::now(),
        })
    }

    /// Analyze only the samples inside `timeframe` before `now`
    pub fn analyze_window(
        &self,
        name: &str,
        history: &[MetricSample],
        timeframe: TimeWindow,
        now: DateTime<Utc>,
        polarity: Polarity,
    ) -> Option<TrendResult> {
        let since = now - timeframe.duration();
        let start = history.partition_point(|s| s.timestamp < since);
        let mut result = self.analyze(name, &history[start..], polarity)?;
        result.timeframe = Some(timeframe);
        Some(result)
    }

    /// Direction from change rate and slope sign
    pub fn classify(&self, change_rate: f64, slope: f64, polarity: Polarity) -> TrendDirection {
        if change_rate.abs() < self.config.stable_band_pct || slope == 0.0 {
            return TrendDirection::Stable;
        }

        match (slope > 0.0, polarity) {
            (true, Polarity::HigherIsBetter) | (false, Polarity::HigherIsWorse) => {
                TrendDirection::Improving
            }
            (true, Polarity::HigherIsWorse) | (false, Polarity::HigherIsBetter) => {
                TrendDirection::Degrading
            }
        }
    }

    /// Detection for a confidently degrading trend
    pub fn detect(&self, trend: &TrendResult) -> Option<Detection> {
        if trend.direction != TrendDirection::Degrading || trend.confidence <= self.config.alert_confidence {
            return None;
        }

        let severity = if trend.change_rate.abs() > self.config.critical_change_pct {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        let message = format!(
            "{} is degrading at {:.1}% per step (confidence {:.2}), projected {:.2}",
            trend.metric, trend.change_rate, trend.confidence, trend.projected_value
        );

        Some(
            Detection::new(
                &trend.metric,
                AlertType::Trend,
                severity,
                trend.current_value,
                trend.window_mean,
                message,
            )
            .with_context("change_rate", format!("{:.2}", trend.change_rate))
            .with_context("confidence", format!("{:.3}", trend.confidence))
            .with_context("projected_value", format!("{:.3}", trend.projected_value)),
        )
    }

    /// Analyze, detect, and hand any detection to the alert manager
    pub fn evaluate(
        &self,
        name: &str,
        history: &[MetricSample],
        polarity: Polarity,
        alerts: &AlertManager,
    ) -> Option<UpsertOutcome> {
        let trend = self.analyze(name, history, polarity)?;
        self.detect(&trend).map(|detection| alerts.upsert(detection))
    }

    fn regression_axis(&self, window: &[MetricSample]) -> Vec<f64> {
        let index_axis = || (0..window.len()).map(|i| i as f64).collect();

        match self.config.axis {
            RegressionAxis::SampleIndex => index_axis(),
            RegressionAxis::ElapsedTime => {
                let (Some(first), Some(last)) = (window.first(), window.last()) else {
                    return index_axis();
                };
                let span_ms = (last.timestamp - first.timestamp).num_milliseconds() as f64;
                if window.len() < 2 || span_ms <= 0.0 {
                    return index_axis();
                }

                // Offsets in units of the mean sampling interval
                let mean_interval_ms = span_ms / (window.len() - 1) as f64;
                window
                    .iter()
                    .map(|s| (s.timestamp - first.timestamp).num_milliseconds() as f64 / mean_interval_ms)
                    .collect()
            }
        }
    }
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new(TrendConfig::default())
    }
}
