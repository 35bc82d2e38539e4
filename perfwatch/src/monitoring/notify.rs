//! Webhook delivery of alert events

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};
use url::Url;

use crate::config::AlertingConfig;
use crate::monitoring::alerts::{AlertEvent, AlertObserver};
use crate::{MonitorError, Result, VERSION};

/// JSON body posted to each webhook
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub system: &'a str,
    pub version: &'static str,
    #[serde(flatten)]
    pub event: &'a AlertEvent,
}

impl<'a> WebhookPayload<'a> {
    pub fn new(system: &'a str, event: &'a AlertEvent) -> Self {
        Self {
            system,
            version: VERSION,
            event,
        }
    }
}

/// Posts alert events to webhook URLs, off the caller's thread
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    urls: Vec<Url>,
    instance: String,
}

impl WebhookNotifier {
    pub fn new(urls: Vec<Url>, timeout: Duration, instance: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            urls,
            instance: instance.into(),
        })
    }

    /// Notifier for the configured URLs, reporting as `instance`
    pub fn from_config(config: &AlertingConfig, instance: &str) -> Result<Self> {
        let urls = config
            .webhook_urls
            .iter()
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| MonitorError::internal(format!("Invalid webhook URL {}: {}", raw, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(urls, Duration::from_millis(config.webhook_timeout_ms), instance)
    }

    pub fn urls(&self) -> &[Url] {
        &self.urls
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Post an event to every URL, returning the first failure
    pub async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        let payload = WebhookPayload::new(&self.instance, event);
        let mut first_error = None;

        for url in &self.urls {
            let outcome = self
                .client
                .post(url.clone())
                .json(&payload)
                .send()
                .await
                .and_then(|response| response.error_for_status());

            match outcome {
                Ok(_) => debug!(url = %url, alert_id = %event.alert().id, "Webhook delivered"),
                Err(e) => {
                    warn!(url = %url, error = %e, "Webhook delivery failed");
                    first_error.get_or_insert(MonitorError::Notification(e));
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl AlertObserver for WebhookNotifier {
    fn on_alert(&self, event: &AlertEvent) {
        if self.urls.is_empty() {
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!(alert_id = %event.alert().id, "No async runtime, skipping webhook delivery");
            return;
        };

        let notifier = self.clone();
        let event = event.clone();
        handle.spawn(async move {
            // Failures are already logged per URL
            let _ = notifier.deliver(&event).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::Detection;
    use crate::monitoring::alerts::{AlertManager, AlertSeverity, AlertType, UpsertOutcome};

    fn created_event() -> AlertEvent {
        let manager = AlertManager::new();
        let detection = Detection::new(
            "api_response_time",
            AlertType::Threshold,
            AlertSeverity::Critical,
            6000.0,
            5000.0,
            "api_response_time is 6000ms",
        );
        match manager.upsert(detection) {
            UpsertOutcome::Created(alert) => AlertEvent::Created(alert),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_payload_shape() {
        let event = created_event();
        let json = serde_json::to_value(WebhookPayload::new("perfwatch-eu-1", &event)).unwrap();

        assert_eq!(json["system"], "perfwatch-eu-1");
        assert_eq!(json["event"], "created");
        assert_eq!(json["alert"]["metric"], "api_response_time");
        assert_eq!(json["alert"]["severity"], "critical");
    }

    #[test]
    fn test_from_config_rejects_bad_urls() {
        let config = AlertingConfig {
            webhook_urls: vec!["not a url".to_string()],
            ..AlertingConfig::default()
        };
        assert!(WebhookNotifier::from_config(&config, "perfwatch").is_err());
    }

    #[test]
    fn test_from_config_keeps_instance_name() {
        let config = AlertingConfig {
            webhook_urls: vec!["http://127.0.0.1:9/hook".to_string()],
            ..AlertingConfig::default()
        };
        let notifier = WebhookNotifier::from_config(&config, "perfwatch-eu-1").unwrap();
        assert_eq!(notifier.instance(), "perfwatch-eu-1");
        assert_eq!(notifier.urls().len(), 1);
    }

    #[test]
    fn test_on_alert_without_runtime_is_noop() {
        let notifier = WebhookNotifier::new(
            vec![Url::parse("http://127.0.0.1:9/hook").unwrap()],
            Duration::from_millis(100),
            "perfwatch",
        )
        .unwrap();
        notifier.on_alert(&created_event());
    }
}
