//! Error types for perfwatch

use thiserror::Error;

/// Result type alias for perfwatch operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Error types for monitoring operations
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid threshold for {metric}: critical ({critical}) must be >= warning ({warning})")]
    InvalidThreshold {
        metric: String,
        warning: f64,
        critical: f64,
    },

    #[error("Invalid time window: {0}")]
    InvalidTimeWindow(String),

    #[error("Invalid polarity: {0}")]
    InvalidPolarity(String),

    #[error("Invalid insight category: {0}")]
    InvalidCategory(String),

    #[error("Health probe timed out: {component} after {timeout_ms}ms")]
    ProbeTimeout { component: String, timeout_ms: u64 },

    #[error("Health probe failed: {component} - {message}")]
    Probe { component: String, message: String },

    #[error("Metric collector failed: {collector} - {message}")]
    Collector { collector: String, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Notification error: {0}")]
    Notification(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Monitor is already running")]
    AlreadyRunning,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// Create a new probe error
    pub fn probe<S: Into<String>>(component: S, message: S) -> Self {
        Self::Probe {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a new collector error
    pub fn collector<S: Into<String>>(collector: S, message: S) -> Self {
        Self::Collector {
            collector: collector.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MonitorError::ProbeTimeout { .. }
                | MonitorError::Probe { .. }
                | MonitorError::Collector { .. }
                | MonitorError::Database(_)
                | MonitorError::Notification(_)
        )
    }

    /// Get the error category for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            MonitorError::Config(_) => "config",
            MonitorError::InvalidThreshold { .. } => "validation",
            MonitorError::InvalidTimeWindow(_) => "validation",
            MonitorError::InvalidPolarity(_) => "validation",
            MonitorError::InvalidCategory(_) => "validation",
            MonitorError::ProbeTimeout { .. } => "timeout",
            MonitorError::Probe { .. } => "probe",
            MonitorError::Collector { .. } => "collector",
            MonitorError::Database(_) => "database",
            MonitorError::Notification(_) => "notification",
            MonitorError::Serialization(_) => "serialization",
            MonitorError::Yaml(_) => "serialization",
            MonitorError::Io(_) => "io",
            MonitorError::AlreadyRunning => "lifecycle",
            MonitorError::Internal(_) => "internal",
        }
    }
}
