//! # perfwatch
//!
//! In-process performance monitoring and alerting engine.
//!
//! Producers record metric samples; the engine keeps a bounded, time-ordered
//! history per metric, runs threshold / anomaly / trend detectors over it,
//! keeps a deduplicated set of alerts, scores component health and projects
//! metrics forward into predictive insights.
//!
//! The entry point is [`PerformanceMonitor`], constructed explicitly by the
//! application and started/stopped by it.

pub mod config;
pub mod detectors;
pub mod error;
pub mod monitor;
pub mod monitoring;
pub mod samples;

pub use crate::config::MonitorConfig;
pub use crate::detectors::{
    AnomalyDetector, AnomalyScore, Detection, ThresholdEvaluator, TrendAnalyzer, TrendDirection,
    TrendResult,
};
pub use crate::error::{MonitorError, Result};
pub use crate::monitor::PerformanceMonitor;
pub use crate::monitoring::{
    Alert, AlertEvent, AlertManager, AlertObserver, AlertSeverity, AlertStats, AlertType,
    ComponentHealth, HealthAggregator, HealthProbe, HealthStatus, MetricCollector, MetricReading,
    PredictiveInsight, ProbeReading, SubscriptionId, SystemHealth, UpsertOutcome,
};
pub use crate::samples::{MetricProfile, MetricQuery, MetricSample, MetricStore, ProfileRegistry, Threshold};

/// Current version of perfwatch
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// System identifier used in exports and notifications
pub const SYSTEM_NAME: &str = "perfwatch";

/// Time windows used for trend queries and prediction horizons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TimeWindow {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    OneWeek,
    #[serde(rename = "30d")]
    OneMonth,
}

impl TimeWindow {
    /// Get the window as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::OneHour => "1h",
            TimeWindow::OneDay => "24h",
            TimeWindow::OneWeek => "7d",
            TimeWindow::OneMonth => "30d",
        }
    }

    /// Length of the window in hours.
    ///
    /// Trend change rates are treated as hourly rates, so this is also the
    /// multiplier used when projecting a metric over the window.
    pub fn hours(&self) -> f64 {
        match self {
            TimeWindow::OneHour => 1.0,
            TimeWindow::OneDay => 24.0,
            TimeWindow::OneWeek => 168.0,
            TimeWindow::OneMonth => 720.0,
        }
    }

    /// Length of the window as a chrono duration
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.hours() as i64)
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TimeWindow {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "1h" | "hour" => Ok(TimeWindow::OneHour),
            "24h" | "1d" | "day" => Ok(TimeWindow::OneDay),
            "7d" | "week" => Ok(TimeWindow::OneWeek),
            "30d" | "month" => Ok(TimeWindow::OneMonth),
            _ => Err(MonitorError::InvalidTimeWindow(s.to_string())),
        }
    }
}

/// Which direction of movement is good for a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Rising values are an improvement (throughput, cache hit rate)
    HigherIsBetter,

    /// Rising values are a regression (latency, error rate, cost)
    HigherIsWorse,
}

impl Polarity {
    /// Get the polarity as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::HigherIsBetter => "higher_is_better",
            Polarity::HigherIsWorse => "higher_is_worse",
        }
    }
}

impl std::str::FromStr for Polarity {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "higher_is_better" | "better" => Ok(Polarity::HigherIsBetter),
            "higher_is_worse" | "worse" => Ok(Polarity::HigherIsWorse),
            _ => Err(MonitorError::InvalidPolarity(s.to_string())),
        }
    }
}

/// Business category a metric's insights are reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    Performance,
    Capacity,
    Cost,
    Quality,
}

impl InsightCategory {
    /// Get the category as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightCategory::Performance => "performance",
            InsightCategory::Capacity => "capacity",
            InsightCategory::Cost => "cost",
            InsightCategory::Quality => "quality",
        }
    }
}

impl std::fmt::Display for InsightCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InsightCategory {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "performance" => Ok(InsightCategory::Performance),
            "capacity" => Ok(InsightCategory::Capacity),
            "cost" => Ok(InsightCategory::Cost),
            "quality" => Ok(InsightCategory::Quality),
            _ => Err(MonitorError::InvalidCategory(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_window_parsing() {
        assert_eq!("1h".parse::<TimeWindow>().unwrap(), TimeWindow::OneHour);
        assert_eq!("24h".parse::<TimeWindow>().unwrap(), TimeWindow::OneDay);
        assert_eq!("7d".parse::<TimeWindow>().unwrap(), TimeWindow::OneWeek);
        assert_eq!("30D".parse::<TimeWindow>().unwrap(), TimeWindow::OneMonth);
        assert!("2h".parse::<TimeWindow>().is_err());
    }

    #[test]
    fn test_time_window_multipliers() {
        assert_eq!(TimeWindow::OneHour.hours(), 1.0);
        assert_eq!(TimeWindow::OneDay.hours(), 24.0);
        assert_eq!(TimeWindow::OneWeek.hours(), 168.0);
        assert_eq!(TimeWindow::OneMonth.hours(), 720.0);
        assert_eq!(TimeWindow::OneWeek.duration(), chrono::Duration::days(7));
    }

    #[test]
    fn test_polarity_parsing() {
        assert_eq!("higher-is-better".parse::<Polarity>().unwrap(), Polarity::HigherIsBetter);
        assert_eq!("higher_is_worse".parse::<Polarity>().unwrap(), Polarity::HigherIsWorse);
        assert!("sideways".parse::<Polarity>().is_err());
    }
}
