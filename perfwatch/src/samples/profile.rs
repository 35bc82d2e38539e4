//! Per-metric profiles: threshold, unit, polarity and insight category

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ProfileConfig;
use crate::{InsightCategory, MonitorError, Polarity, Result};

/// Static warning/critical boundary for a metric. `critical >= warning` always.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub metric: String,
    pub warning: f64,
    pub critical: f64,
    pub unit: String,
}

impl Threshold {
    /// Create a validated threshold
    pub fn new(
        metric: impl Into<String>,
        warning: f64,
        critical: f64,
        unit: impl Into<String>,
    ) -> Result<Self> {
        let metric = metric.into();
        if !warning.is_finite() || !critical.is_finite() || critical < warning {
            return Err(MonitorError::InvalidThreshold {
                metric,
                warning,
                critical,
            });
        }

        Ok(Self {
            metric,
            warning,
            critical,
            unit: unit.into(),
        })
    }
}

/// Everything the engine knows about a metric besides its samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricProfile {
    pub name: String,
    pub unit: String,
    pub threshold: Option<Threshold>,
    pub polarity: Polarity,
    pub category: InsightCategory,
}

impl MetricProfile {
    /// Profile with no threshold
    pub fn new(name: impl Into<String>, unit: impl Into<String>, polarity: Polarity) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            threshold: None,
            polarity,
            category: InsightCategory::Performance,
        }
    }

    /// Attach a threshold
    pub fn with_threshold(mut self, warning: f64, critical: f64) -> Result<Self> {
        self.threshold = Some(Threshold::new(self.name.clone(), warning, critical, self.unit.clone())?);
        Ok(self)
    }

    /// Set the insight category
    pub fn with_category(mut self, category: InsightCategory) -> Self {
        self.category = category;
        self
    }
}

/// Concurrent registry of metric profiles
pub struct ProfileRegistry {
    profiles: DashMap<String, MetricProfile>,
    default_polarity: Polarity,
}

impl ProfileRegistry {
    /// Create an empty registry
    pub fn new(default_polarity: Polarity) -> Self {
        Self {
            profiles: DashMap::new(),
            default_polarity,
        }
    }

    /// Profiles used by the domain recording helpers
    pub fn with_conventional_profiles(default_polarity: Polarity) -> Self {
        use crate::samples::names;

        let registry = Self::new(default_polarity);
        let conventional = [
            MetricProfile::new(names::API_RESPONSE_TIME, "ms", Polarity::HigherIsWorse)
                .with_threshold(2000.0, 5000.0),
            Ok(MetricProfile::new(names::API_ERRORS, "count", Polarity::HigherIsWorse)
                .with_category(InsightCategory::Quality)),
            MetricProfile::new(names::AI_OPERATION_DURATION, "ms", Polarity::HigherIsWorse)
                .with_threshold(10_000.0, 30_000.0),
            Ok(MetricProfile::new(names::AI_TOKENS_USED, "tokens", Polarity::HigherIsWorse)
                .with_category(InsightCategory::Capacity)),
            Ok(MetricProfile::new(names::AI_OPERATION_COST, "usd", Polarity::HigherIsWorse)
                .with_category(InsightCategory::Cost)),
            MetricProfile::new(names::DB_QUERY_DURATION, "ms", Polarity::HigherIsWorse)
                .with_threshold(1000.0, 3000.0),
            Ok(MetricProfile::new(names::CACHE_HIT, "ratio", Polarity::HigherIsBetter)
                .with_category(InsightCategory::Capacity)),
            Ok(MetricProfile::new(names::ERRORS, "count", Polarity::HigherIsWorse)
                .with_category(InsightCategory::Quality)),
        ];

        for profile in conventional.into_iter().flatten() {
            registry.profiles.insert(profile.name.clone(), profile);
        }
        registry
    }

    /// Insert or replace a profile
    pub fn upsert(&self, profile: MetricProfile) -> Result<()> {
        if let Some(threshold) = &profile.threshold {
            Threshold::new(&threshold.metric, threshold.warning, threshold.critical, &threshold.unit)?;
        }
        info!(metric = %profile.name, polarity = profile.polarity.as_str(), "Metric profile registered");
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    /// Apply a profile from configuration on top of any existing one
    pub fn apply_config(&self, config: &ProfileConfig) -> Result<()> {
        let mut profile = self.get(&config.name).unwrap_or_else(|| {
            MetricProfile::new(config.name.clone(), config.unit.clone(), self.default_polarity)
        });

        if !config.unit.is_empty() {
            profile.unit = config.unit.clone();
        }
        if let Some(polarity) = config.polarity {
            profile.polarity = polarity;
        }
        if let Some(category) = config.category {
            profile.category = category;
        }
        match (config.warning, config.critical) {
            (Some(warning), Some(critical)) => {
                profile.threshold = Some(Threshold::new(&config.name, warning, critical, &profile.unit)?);
            }
            (Some(bound), None) | (None, Some(bound)) => {
                profile.threshold = Some(Threshold::new(&config.name, bound, bound, &profile.unit)?);
            }
            (None, None) => {}
        }

        self.upsert(profile)
    }

    /// Register or replace the threshold of a metric, keeping its polarity
    pub fn set_threshold(&self, metric: &str, warning: f64, critical: f64) -> Result<Threshold> {
        let mut entry = self.profiles.entry(metric.to_string()).or_insert_with(|| {
            MetricProfile::new(metric, String::new(), self.default_polarity)
        });
        let threshold = Threshold::new(metric, warning, critical, entry.unit.clone())?;
        entry.threshold = Some(threshold.clone());

        info!(metric, warning, critical, "Threshold registered");
        Ok(threshold)
    }

    /// Set the polarity of a metric
    pub fn set_polarity(&self, metric: &str, polarity: Polarity) {
        self.profiles
            .entry(metric.to_string())
            .or_insert_with(|| MetricProfile::new(metric, String::new(), polarity))
            .polarity = polarity;
    }

    pub fn get(&self, metric: &str) -> Option<MetricProfile> {
        self.profiles.get(metric).map(|p| p.clone())
    }

    pub fn threshold(&self, metric: &str) -> Option<Threshold> {
        self.profiles.get(metric).and_then(|p| p.threshold.clone())
    }

    /// Polarity of a metric, falling back to the registry default
    pub fn polarity(&self, metric: &str) -> Polarity {
        self.profiles
            .get(metric)
            .map_or(self.default_polarity, |p| p.polarity)
    }

    pub fn category(&self, metric: &str) -> InsightCategory {
        self.profiles
            .get(metric)
            .map_or(InsightCategory::Performance, |p| p.category)
    }

    /// All profiles, sorted by name
    pub fn list(&self) -> Vec<MetricProfile> {
        let mut profiles: Vec<MetricProfile> = self.profiles.iter().map(|p| p.clone()).collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new(Polarity::HigherIsWorse)
    }
}
