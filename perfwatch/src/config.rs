//! Configuration management for perfwatch

use ::config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use url::Url;

use crate::monitoring::health::ScoreRule;
use crate::{InsightCategory, Polarity, Result};

/// Main configuration structure for the monitor
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    /// Global settings
    pub global: GlobalConfig,

    /// Metric history limits
    pub store: StoreConfig,

    /// Periodic tick settings
    pub scheduler: SchedulerConfig,

    /// Z-score anomaly detection
    pub anomaly: AnomalyConfig,

    /// Regression trend analysis
    pub trend: TrendConfig,

    /// Predictive insights
    pub insights: InsightConfig,

    /// Component health scoring
    pub health: HealthConfig,

    /// Best-effort metric persistence
    pub persistence: PersistenceConfig,

    /// Alert notifications
    pub alerting: AlertingConfig,

    /// Per-metric thresholds, polarity and category
    pub profiles: Vec<ProfileConfig>,
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Log level, used when `--log-level` is not given
    pub log_level: String,

    /// Instance name reported in dashboards and webhook payloads
    pub instance_name: String,
}

/// Metric history limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum samples kept per metric
    pub capacity: usize,

    /// Maximum sample age in seconds
    pub max_age_secs: u64,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tick interval in seconds
    pub interval_secs: u64,

    /// Timeout for each external metric collector in milliseconds
    pub collector_timeout_ms: u64,

    /// Resolved alerts older than this are purged
    pub alert_retention_secs: u64,

    /// Run detectors synchronously on every recorded sample
    pub evaluate_on_write: bool,
}

/// Anomaly detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Minimum history length before detection runs
    pub min_history: usize,

    /// Number of most recent samples compared against the baseline
    pub recent_window: usize,

    /// Number of samples preceding the recent window used as baseline
    pub baseline_window: usize,

    /// Z-score above which a warning fires
    pub warning_z: f64,

    /// Z-score above which a critical alert fires
    pub critical_z: f64,

    /// Floor for a zero baseline std-dev, as a fraction of the baseline mean
    pub min_std_dev_ratio: f64,
}

/// Axis the trend regression is fitted against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionAxis {
    /// Sample position 0..n-1
    SampleIndex,

    /// Timestamp offsets normalised by the mean sampling interval
    ElapsedTime,
}

/// Trend analyzer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Minimum history length before analysis runs
    pub min_samples: usize,

    /// Number of most recent samples fitted
    pub window: usize,

    /// |change rate| below this percentage is stable
    pub stable_band_pct: f64,

    /// Confidence required before a degrading trend raises an alert
    pub alert_confidence: f64,

    /// |change rate| above this percentage makes a trend alert critical
    pub critical_change_pct: f64,

    /// Polarity for metrics without a registered profile
    pub default_polarity: Polarity,

    /// Regression axis
    pub axis: RegressionAxis,
}

/// Predictive insight configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Minimum history length for a metric to be projected
    pub min_history: usize,

    /// Trends below this confidence are skipped
    pub min_confidence: f64,
}

/// Health aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Per-probe timeout in milliseconds
    pub probe_timeout_ms: u64,

    /// Overall scores below this get an immediate-attention recommendation
    pub attention_score: f64,

    /// Score penalty rules applied to each component reading
    pub rules: Vec<ScoreRule>,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Enable the background metric writer
    pub enabled: bool,

    /// Postgres connection URL
    pub database_url: Option<String>,

    /// Hand-off queue capacity; records beyond it are dropped
    pub channel_capacity: usize,

    /// Organization id stamped on persisted records
    pub organization_id: Option<String>,
}

/// Alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Webhook URLs receiving alert events
    pub webhook_urls: Vec<String>,

    /// Webhook request timeout in milliseconds
    pub webhook_timeout_ms: u64,
}

/// Per-metric profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default)]
    pub unit: String,
    pub warning: Option<f64>,
    pub critical: Option<f64>,
    pub polarity: Option<Polarity>,
    pub category: Option<InsightCategory>,
}

impl MonitorConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/perfwatch").required(false))
            .add_source(
                File::with_name(&format!(
                    "config/perfwatch-{}",
                    std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into())
                ))
                .required(false),
            )
            .add_source(File::with_name("config/perfwatch-local").required(false))
            .add_source(Environment::with_prefix("PERFWATCH").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a single file (format inferred from extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("PERFWATCH").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Write the configuration as YAML
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.global.instance_name.trim().is_empty() {
            return Err(ConfigError::Message("global.instance_name must not be empty".into()));
        }
        if self.store.capacity == 0 {
            return Err(ConfigError::Message("store.capacity must be greater than 0".into()));
        }
        if self.store.max_age_secs == 0 {
            return Err(ConfigError::Message("store.max_age_secs must be greater than 0".into()));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Message(
                "scheduler.interval_secs must be greater than 0".into(),
            ));
        }

        if !(100..=30_000).contains(&self.health.probe_timeout_ms) {
            return Err(ConfigError::Message(format!(
                "health.probe_timeout_ms must be between 100 and 30000, got {}",
                self.health.probe_timeout_ms
            )));
        }
        if !(2_000..=5_000).contains(&self.health.probe_timeout_ms) {
            warn!(
                probe_timeout_ms = self.health.probe_timeout_ms,
                "Probe timeout outside the recommended 2-5s range"
            );
        }

        let anomaly = &self.anomaly;
        if anomaly.recent_window == 0 || anomaly.baseline_window == 0 {
            return Err(ConfigError::Message("anomaly windows must be greater than 0".into()));
        }
        if anomaly.recent_window + anomaly.baseline_window > anomaly.min_history {
            return Err(ConfigError::Message(format!(
                "anomaly.min_history ({}) must cover recent_window + baseline_window ({})",
                anomaly.min_history,
                anomaly.recent_window + anomaly.baseline_window
            )));
        }
        if anomaly.critical_z < anomaly.warning_z {
            return Err(ConfigError::Message(
                "anomaly.critical_z must be >= anomaly.warning_z".into(),
            ));
        }

        if self.trend.min_samples < 2 || self.trend.window < self.trend.min_samples {
            return Err(ConfigError::Message(
                "trend.window must be >= trend.min_samples >= 2".into(),
            ));
        }
        for (name, value) in [
            ("trend.alert_confidence", self.trend.alert_confidence),
            ("insights.min_confidence", self.insights.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Message(format!("{} must be within [0, 1]", name)));
            }
        }

        for profile in &self.profiles {
            if let (Some(warning), Some(critical)) = (profile.warning, profile.critical) {
                if critical < warning {
                    return Err(ConfigError::Message(format!(
                        "Profile {}: critical ({}) must be >= warning ({})",
                        profile.name, critical, warning
                    )));
                }
            }
        }

        if self.persistence.enabled {
            match &self.persistence.database_url {
                Some(url) if Url::parse(url).is_ok() => {}
                Some(url) => {
                    return Err(ConfigError::Message(format!("Invalid database URL: {}", url)));
                }
                None => {
                    return Err(ConfigError::Message(
                        "persistence.database_url is required when persistence is enabled".into(),
                    ));
                }
            }
            if self.persistence.channel_capacity == 0 {
                return Err(ConfigError::Message(
                    "persistence.channel_capacity must be greater than 0".into(),
                ));
            }
        }

        for url in &self.alerting.webhook_urls {
            if Url::parse(url).is_err() {
                return Err(ConfigError::Message(format!("Invalid webhook URL: {}", url)));
            }
        }

        Ok(())
    }
}

impl StoreConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_millis(self.collector_timeout_ms)
    }

    pub fn alert_retention(&self) -> Duration {
        Duration::from_secs(self.alert_retention_secs)
    }
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            instance_name: crate::SYSTEM_NAME.to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            max_age_secs: 24 * 60 * 60,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            collector_timeout_ms: 3000,
            alert_retention_secs: 7 * 24 * 60 * 60,
            evaluate_on_write: true,
        }
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            min_history: 20,
            recent_window: 5,
            baseline_window: 15,
            warning_z: 2.5,
            critical_z: 3.0,
            min_std_dev_ratio: 0.01,
        }
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            window: 10,
            stable_band_pct: 5.0,
            alert_confidence: 0.8,
            critical_change_pct: 50.0,
            default_polarity: Polarity::HigherIsWorse,
            axis: RegressionAxis::SampleIndex,
        }
    }
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            min_history: 10,
            min_confidence: 0.6,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 3000,
            attention_score: 70.0,
            rules: ScoreRule::defaults(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            database_url: None,
            channel_capacity: 1024,
            organization_id: None,
        }
    }
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            webhook_urls: vec![],
            webhook_timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.capacity, 1000);
        assert_eq!(config.anomaly.min_history, 20);
        assert_eq!(config.trend.axis, RegressionAxis::SampleIndex);
        assert!(!config.health.rules.is_empty());
    }

    #[test]
    fn test_inverted_profile_rejected() {
        let mut config = MonitorConfig::default();
        config.profiles.push(ProfileConfig {
            name: "api_response_time".to_string(),
            unit: "ms".to_string(),
            warning: Some(5000.0),
            critical: Some(2000.0),
            polarity: None,
            category: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_anomaly_windows_must_fit_history() {
        let mut config = MonitorConfig::default();
        config.anomaly.baseline_window = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_persistence_requires_url() {
        let mut config = MonitorConfig::default();
        config.persistence.enabled = true;
        assert!(config.validate().is_err());

        config.persistence.database_url = Some("postgres://localhost/perfwatch".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_probe_timeout_bounds() {
        let mut config = MonitorConfig::default();
        config.health.probe_timeout_ms = 10;
        assert!(config.validate().is_err());

        config.health.probe_timeout_ms = 8000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_round_trip_keeps_sections() {
        let config = MonitorConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: MonitorConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.scheduler.interval_secs, config.scheduler.interval_secs);
        assert_eq!(parsed.health.rules.len(), config.health.rules.len());
    }

    #[test]
    fn test_global_section_from_yaml() {
        let parsed: MonitorConfig =
            serde_yaml::from_str("global:\n  log_level: debug\n  instance_name: perfwatch-eu-1\n").unwrap();
        assert_eq!(parsed.global.log_level, "debug");
        assert_eq!(parsed.global.instance_name, "perfwatch-eu-1");
        assert!(parsed.validate().is_ok());

        let mut config = MonitorConfig::default();
        config.global.instance_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: MonitorConfig = serde_yaml::from_str("store:\n  capacity: 50\n").unwrap();
        assert_eq!(parsed.store.capacity, 50);
        assert_eq!(parsed.store.max_age_secs, 24 * 60 * 60);
        assert_eq!(parsed.anomaly.recent_window, 5);
    }
}
