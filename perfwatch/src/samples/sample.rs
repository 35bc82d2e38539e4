//! Metric sample type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Tag set attached to a sample. Ordered so exports are stable.
pub type Tags = BTreeMap<String, String>;

/// A single recorded observation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Metric name
    pub name: String,

    /// Observed value
    pub value: f64,

    /// Unit of the value ("ms", "%", "usd", ...)
    pub unit: String,

    /// When the observation was made
    pub timestamp: DateTime<Utc>,

    /// Tags for grouping and filtering
    pub tags: Tags,

    /// Producer-supplied context, carried into alerts and persisted records
    pub context: HashMap<String, String>,
}

impl MetricSample {
    /// Create a sample stamped with the current time
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            timestamp: Utc::now(),
            tags: Tags::new(),
            context: HashMap::new(),
        }
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add multiple tags
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Add context entries
    pub fn with_context(mut self, context: HashMap<String, String>) -> Self {
        self.context.extend(context);
        self
    }

    /// Get a tag value
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// True when every filter tag is present with the same value
    pub fn matches_tags(&self, filter: &Tags) -> bool {
        filter
            .iter()
            .all(|(key, value)| self.tags.get(key) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_matching() {
        let sample = MetricSample::new("api_response_time", 120.0, "ms")
            .with_tag("endpoint", "/chat")
            .with_tag("method", "POST");

        let mut filter = Tags::new();
        assert!(sample.matches_tags(&filter));

        filter.insert("endpoint".to_string(), "/chat".to_string());
        assert!(sample.matches_tags(&filter));

        filter.insert("method".to_string(), "GET".to_string());
        assert!(!sample.matches_tags(&filter));
    }
}
