//! Alert lifecycle: dedup, creation, resolution, retention
//!
//! At most one unresolved alert exists per (metric, alert type). A resolved
//! alert is terminal; a recurring condition creates a new alert with a new id.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::detectors::Detection;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Should be investigated
    Warning,

    /// Requires immediate action
    Critical,
}

impl AlertSeverity {
    /// Check if the severity requires immediate attention
    pub fn requires_immediate_attention(&self) -> bool {
        matches!(self, AlertSeverity::Critical)
    }

    /// Get the severity as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// Which detector raised an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Threshold,
    Anomaly,
    Trend,
    Prediction,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Threshold => "threshold",
            AlertType::Anomaly => "anomaly",
            AlertType::Trend => "trend",
            AlertType::Prediction => "prediction",
        }
    }
}

/// An alert instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert ID
    pub id: String,

    /// Metric the alert is about
    pub metric: String,

    pub alert_type: AlertType,
    pub severity: AlertSeverity,

    /// Value that triggered the alert
    pub value: f64,

    /// Threshold or baseline the value was compared against
    pub reference: f64,

    pub message: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,

    /// Additional context
    pub context: HashMap<String, String>,
    pub recommendations: Vec<String>,
}

impl Alert {
    fn from_detection(detection: Detection, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            metric: detection.metric,
            alert_type: detection.alert_type,
            severity: detection.severity,
            value: detection.value,
            reference: detection.reference,
            message: detection.message,
            created_at,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            context: detection.context,
            recommendations: detection.recommendations,
        }
    }

    /// True until the alert is resolved
    pub fn is_active(&self) -> bool {
        !self.resolved
    }
}

/// Lifecycle events delivered to observers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "alert", rename_all = "lowercase")]
pub enum AlertEvent {
    Created(Alert),
    Resolved(Alert),
}

impl AlertEvent {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertEvent::Created(alert) | AlertEvent::Resolved(alert) => alert,
        }
    }
}

/// Receives alert lifecycle events.
///
/// Called synchronously on the thread that created or resolved the alert,
/// after internal locks are released; implementations must not block.
pub trait AlertObserver: Send + Sync {
    fn on_alert(&self, event: &AlertEvent);
}

/// Handle returned by [`AlertManager::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Result of an upsert
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    /// A new alert was created
    Created(Alert),

    /// An unresolved alert already existed for the (metric, type) pair
    Deduplicated { existing_id: String },
}

impl UpsertOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

#[derive(Default)]
struct AlertState {
    alerts: HashMap<String, Alert>,

    /// (metric, type) -> id of the unresolved alert
    active: HashMap<(String, AlertType), String>,
}

/// Alert manager that deduplicates detections and tracks alert lifecycle
pub struct AlertManager {
    state: RwLock<AlertState>,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn AlertObserver>)>>,
    next_subscription: AtomicU64,
}

impl AlertManager {
    /// Create a new alert manager
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AlertState::default()),
            observers: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Create an alert for a detection unless one is already open for its
    /// (metric, type) pair
    pub fn upsert(&self, detection: Detection) -> UpsertOutcome {
        self.upsert_at(detection, Utc::now())
    }

    /// [`upsert`](Self::upsert) with an explicit creation time
    pub fn upsert_at(&self, detection: Detection, now: DateTime<Utc>) -> UpsertOutcome {
        let alert = {
            let mut state = self.state.write();
            let key = (detection.metric.clone(), detection.alert_type);

            if let Some(existing_id) = state.active.get(&key) {
                debug!(
                    metric = %detection.metric,
                    alert_type = detection.alert_type.as_str(),
                    "Alert already open, skipping"
                );
                return UpsertOutcome::Deduplicated {
                    existing_id: existing_id.clone(),
                };
            }

            let alert = Alert::from_detection(detection, now);
            state.active.insert(key, alert.id.clone());
            state.alerts.insert(alert.id.clone(), alert.clone());
            alert
        };

        info!(
            alert_id = %alert.id,
            metric = %alert.metric,
            alert_type = alert.alert_type.as_str(),
            severity = alert.severity.as_str(),
            "🚨 Alert created: {}",
            alert.message
        );
        metrics::increment_counter!(
            "perfwatch_alerts_created_total",
            "type" => alert.alert_type.as_str(),
            "severity" => alert.severity.as_str()
        );

        self.notify(&AlertEvent::Created(alert.clone()));
        UpsertOutcome::Created(alert)
    }

    /// Resolve an alert. Returns false when the id is unknown.
    pub fn resolve(&self, id: &str, resolved_by: Option<&str>) -> bool {
        let resolved = {
            let mut state = self.state.write();
            let Some(alert) = state.alerts.get_mut(id) else {
                return false;
            };
            if alert.resolved {
                return true;
            }

            alert.resolved = true;
            alert.resolved_at = Some(Utc::now());
            alert.resolved_by = resolved_by.map(str::to_string);
            let resolved = alert.clone();

            state.active.remove(&(resolved.metric.clone(), resolved.alert_type));
            resolved
        };

        info!(alert_id = %resolved.id, metric = %resolved.metric, "✅ Alert resolved");
        metrics::increment_counter!("perfwatch_alerts_resolved_total");

        self.notify(&AlertEvent::Resolved(resolved));
        true
    }

    /// Get an alert by id
    pub fn get(&self, id: &str) -> Option<Alert> {
        self.state.read().alerts.get(id).cloned()
    }

    /// All unresolved alerts, oldest first
    pub fn list_active(&self) -> Vec<Alert> {
        let state = self.state.read();
        let mut active: Vec<Alert> = state
            .active
            .values()
            .filter_map(|id| state.alerts.get(id).cloned())
            .collect();
        active.sort_by_key(|a| a.created_at);
        active
    }

    /// Unresolved alerts of a severity
    pub fn list_by_severity(&self, severity: AlertSeverity) -> Vec<Alert> {
        self.list_active()
            .into_iter()
            .filter(|a| a.severity == severity)
            .collect()
    }

    /// Unresolved critical alerts
    pub fn critical_active(&self) -> Vec<Alert> {
        self.list_by_severity(AlertSeverity::Critical)
    }

    /// Remove resolved alerts older than `max_age`. Unresolved alerts are kept.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        self.cleanup_at(Utc::now(), max_age)
    }

    /// [`cleanup`](Self::cleanup) relative to an explicit time
    pub fn cleanup_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|max_age| now.checked_sub_signed(max_age))
        else {
            return 0;
        };

        let mut state = self.state.write();
        let before = state.alerts.len();
        state
            .alerts
            .retain(|_, alert| !(alert.resolved && alert.created_at < cutoff));
        let removed = before - state.alerts.len();

        if removed > 0 {
            debug!(removed, "Purged resolved alerts");
        }
        removed
    }

    /// Register an observer
    pub fn subscribe(&self, observer: Arc<dyn AlertObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Remove an observer. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    /// Get alert statistics
    pub fn stats(&self) -> AlertStats {
        let state = self.state.read();
        let mut stats = AlertStats {
            total_retained: state.alerts.len(),
            ..AlertStats::default()
        };

        for alert in state.alerts.values() {
            if alert.resolved {
                stats.resolved_count += 1;
                continue;
            }
            stats.active_alerts += 1;
            match alert.severity {
                AlertSeverity::Critical => stats.critical_count += 1,
                AlertSeverity::Warning => stats.warning_count += 1,
            }
        }
        stats
    }

    fn notify(&self, event: &AlertEvent) {
        let observers: Vec<Arc<dyn AlertObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer.on_alert(event);
        }
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Alert statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertStats {
    pub active_alerts: usize,
    pub critical_count: usize,
    pub warning_count: usize,
    pub resolved_count: usize,
    pub total_retained: usize,
}
