use anyhow::Result;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::SecurityEvent;

/// Cliente HTTP para entregar alertas a un webhook externo.
///
/// La entrega es de mejor esfuerzo: un timeout o un estado no exitoso se
/// registra y se descarta, nunca se reintenta.
#[derive(Debug, Clone)]
pub struct WebhookAlerter {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookAlerter {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("vigil-security-monitor/0.1")
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Arma el payload con resumen y campos titulados.
    pub fn build_payload(event: &SecurityEvent) -> Value {
        let source_ip = event.source_ip.as_deref().unwrap_or("unknown");
        json!({
            "summary": format!(
                "Security alert: {} from {}",
                event.event_type.as_str(),
                source_ip
            ),
            "fields": [
                { "title": "Type", "value": event.event_type.as_str() },
                { "title": "Severity", "value": event.severity.as_str() },
                { "title": "Source IP", "value": source_ip },
                { "title": "Timestamp", "value": event.timestamp.to_rfc3339() },
                { "title": "Description", "value": event.description },
            ],
        })
    }

    /// Envía la alerta al endpoint configurado.
    pub async fn send(&self, event: &SecurityEvent) {
        let payload = Self::build_payload(event);
        let result = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(status = %response.status(), "Alert webhook delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "Alert webhook rejected");
            }
            Err(error) => {
                warn!(error = %error, "Alert webhook delivery failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventType;

    #[test]
    fn test_payload_carries_summary_and_titled_fields() {
        let event = SecurityEvent::new(
            EventType::SqlInjection,
            Some("203.0.113.50".to_string()),
            json!({"pattern": "union_select"}),
            None,
        );
        let payload = WebhookAlerter::build_payload(&event);

        let summary = payload["summary"].as_str().unwrap();
        assert!(summary.contains("sql_injection"));
        assert!(summary.contains("203.0.113.50"));

        let fields = payload["fields"].as_array().unwrap();
        let titles: Vec<&str> = fields
            .iter()
            .map(|f| f["title"].as_str().unwrap())
            .collect();
        assert_eq!(
            titles,
            vec!["Type", "Severity", "Source IP", "Timestamp", "Description"]
        );
        assert_eq!(fields[1]["value"], json!("high"));
    }

    #[test]
    fn test_payload_without_source_ip_uses_placeholder() {
        let event = SecurityEvent::new(EventType::BruteForceAttempt, None, json!({}), None);
        let payload = WebhookAlerter::build_payload(&event);
        assert!(payload["summary"].as_str().unwrap().contains("unknown"));
        assert_eq!(payload["fields"][2]["value"], json!("unknown"));
    }

    #[test]
    fn test_alerter_builds_with_timeout() {
        let alerter = WebhookAlerter::new(
            "https://hooks.example.invalid/security".to_string(),
            Duration::from_millis(500),
        )
        .unwrap();
        assert_eq!(alerter.endpoint(), "https://hooks.example.invalid/security");
    }
}
