//! Alerting, health, insights and the periodic monitoring pass
//!
//! Everything here consumes metric history from [`crate::samples`] and the
//! detections produced by [`crate::detectors`].

pub mod alerts;
pub mod export;
pub mod health;
pub mod insights;
pub mod notify;
pub mod persistence;
pub mod scheduler;

pub use alerts::{
    Alert, AlertEvent, AlertManager, AlertObserver, AlertSeverity, AlertStats, AlertType,
    SubscriptionId, UpsertOutcome,
};
pub use export::{prometheus_text, DashboardSnapshot};
pub use health::{
    ComparisonOperator, ComponentHealth, HealthAggregator, HealthProbe, HealthSignal, HealthStatus,
    ProbeReading, ScoreRule, SystemHealth,
};
pub use insights::{ImpactLevel, InsightRecommendations, PredictiveInsight, PredictiveInsightGenerator};
pub use notify::WebhookNotifier;
pub use persistence::{MetricRecord, MetricSink, MetricWriter, PostgresMetricSink};
pub use scheduler::{MetricCollector, MetricReading, Scheduler, TickReport, TickTask};
