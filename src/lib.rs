//! Motor de monitoreo de seguridad y detección de amenazas en memoria.
//!
//! Inspecciona peticiones HTTP contra un catálogo de patrones de ataque,
//! acumula puntajes de sospecha por IP de origen, aplica bloqueos por fuerza
//! bruta en los intentos de login y despacha alertas para los eventos graves.
//! Todo el estado vive en memoria y se comparte entre tareas mediante `Arc`.

pub mod alerting;
pub mod inspector;
pub mod monitor;
pub mod storage;
pub mod tracker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

pub use alerting::{AlertDispatcher, WebhookAlerter};
pub use inspector::{PatternCatalog, RequestInspector};
pub use monitor::{SecurityExport, SecurityMetrics, SecurityMonitor};
pub use storage::{EventQuery, SecurityEventStore};
pub use tracker::{
    BlockOutcome, IpBlockRegistry, LoginAttemptOutcome, LoginAttemptTracker, SuspicionRecord,
    SuspicionTracker,
};

/// Severidad de un evento de seguridad, ordenada de menor a mayor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Clasificación de los eventos que el motor registra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SqlInjection,
    Xss,
    PathTraversal,
    CommandInjection,
    SuspiciousUserAgent,
    SuspiciousContentType,
    FailedLogin,
    BruteForceAttempt,
    IpBlocked,
    IpUnblocked,
    Other,
}

impl EventType {
    /// Nombre en formato de cable, igual al usado por serde.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SqlInjection => "sql_injection",
            EventType::Xss => "xss",
            EventType::PathTraversal => "path_traversal",
            EventType::CommandInjection => "command_injection",
            EventType::SuspiciousUserAgent => "suspicious_user_agent",
            EventType::SuspiciousContentType => "suspicious_content_type",
            EventType::FailedLogin => "failed_login",
            EventType::BruteForceAttempt => "brute_force_attempt",
            EventType::IpBlocked => "ip_blocked",
            EventType::IpUnblocked => "ip_unblocked",
            EventType::Other => "other",
        }
    }

    /// Severidad asignada cuando el evento no trae una explícita.
    pub fn default_severity(&self) -> Severity {
        match self {
            EventType::SqlInjection => Severity::High,
            EventType::Xss => Severity::High,
            EventType::PathTraversal => Severity::High,
            EventType::CommandInjection => Severity::Critical,
            EventType::SuspiciousUserAgent => Severity::Low,
            EventType::SuspiciousContentType => Severity::Low,
            EventType::FailedLogin => Severity::Low,
            EventType::BruteForceAttempt => Severity::High,
            EventType::IpBlocked => Severity::High,
            EventType::IpUnblocked => Severity::Low,
            EventType::Other => Severity::Low,
        }
    }

    /// Descripción legible por defecto.
    pub fn describe(&self) -> &'static str {
        match self {
            EventType::SqlInjection => "SQL injection pattern detected in request",
            EventType::Xss => "Cross-site scripting pattern detected in request",
            EventType::PathTraversal => "Path traversal pattern detected in request",
            EventType::CommandInjection => "Command injection pattern detected in request",
            EventType::SuspiciousUserAgent => "Known scanner user agent detected",
            EventType::SuspiciousContentType => "GET request with form content type",
            EventType::FailedLogin => "Failed login attempt",
            EventType::BruteForceAttempt => "Brute force login threshold exceeded",
            EventType::IpBlocked => "Source IP added to block list",
            EventType::IpUnblocked => "Source IP removed from block list",
            EventType::Other => "Unclassified security event",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Contexto mínimo de la petición que acompaña a un evento.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub user_agent: Option<String>,
    pub geo_hint: Option<String>,
}

impl RequestContext {
    pub fn from_snapshot(snapshot: &RequestSnapshot) -> Self {
        Self {
            method: snapshot.method.clone(),
            path: snapshot.path.clone(),
            user_agent: snapshot.user_agent().map(str::to_string),
            geo_hint: snapshot.geo_hint().map(str::to_string),
        }
    }
}

/// Evento de seguridad registrado por el motor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub source_ip: Option<String>,
    pub severity: Severity,
    pub description: String,
    pub details: Value,
    pub request_context: Option<RequestContext>,
}

impl SecurityEvent {
    /// Crea un evento con severidad y descripción derivadas del tipo.
    pub fn new(
        event_type: EventType,
        source_ip: Option<String>,
        details: Value,
        request_context: Option<RequestContext>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            source_ip,
            severity: event_type.default_severity(),
            description: event_type.describe().to_string(),
            details,
            request_context,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Hallazgo individual producido por el inspector de peticiones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatFinding {
    pub event_type: EventType,
    pub severity: Severity,
    pub description: String,
    pub details: Value,
}

/// Vista normalizada de una petición HTTP entrante.
///
/// Los campos estructurados (`query`, `body`, `route_params`) llegan como
/// JSON arbitrario; el inspector los serializa y decodifica sin fallar ante
/// datos malformados.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    pub path: String,
    pub query: Value,
    pub body: Value,
    pub route_params: Value,
    pub headers: HashMap<String, String>,
    pub source_ip: String,
}

impl RequestSnapshot {
    /// Busca un header sin distinguir mayúsculas de minúsculas.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn geo_hint(&self) -> Option<&str> {
        self.header("cf-ipcountry")
            .or_else(|| self.header("x-geoip-country"))
    }
}

/// Configuración del motor, cargada del entorno con valores por defecto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Intentos fallidos permitidos dentro de la ventana antes del bloqueo.
    pub max_login_attempts: u32,
    /// Duración del bloqueo de login en milisegundos.
    pub lockout_duration_ms: i64,
    /// Ventana deslizante para contar intentos fallidos, en milisegundos.
    pub brute_force_window_ms: i64,
    /// Puntaje acumulado que dispara el bloqueo automático de una IP.
    pub suspicious_activity_threshold: i64,
    /// IPs confiables adicionales; el loopback siempre se considera confiable.
    pub trusted_ips: Vec<String>,
    /// URL del webhook de alertas, si está configurado.
    pub alert_webhook: Option<String>,
    /// Retención de estado en milisegundos antes del barrido periódico.
    pub retention_period_ms: i64,
    /// Intervalo entre barridos de limpieza, en milisegundos.
    pub cleanup_interval_ms: u64,
    /// Tiempo máximo de espera en la entrega del webhook, en milisegundos.
    pub webhook_timeout_ms: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lockout_duration_ms: 1_800_000,
            brute_force_window_ms: 300_000,
            suspicious_activity_threshold: 10,
            trusted_ips: Vec::new(),
            alert_webhook: None,
            retention_period_ms: 604_800_000,
            cleanup_interval_ms: 3_600_000,
            webhook_timeout_ms: 5_000,
        }
    }
}

impl SecurityConfig {
    /// Lee la configuración de variables de entorno.
    ///
    /// Un valor ausente o no parseable cae en el valor por defecto; la carga
    /// nunca falla.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.max_login_attempts = env_parse("MAX_LOGIN_ATTEMPTS", config.max_login_attempts);
        config.lockout_duration_ms =
            env_parse("LOGIN_LOCKOUT_DURATION_MS", config.lockout_duration_ms);
        config.suspicious_activity_threshold = env_parse(
            "SUSPICIOUS_ACTIVITY_THRESHOLD",
            config.suspicious_activity_threshold,
        );
        config.retention_period_ms = env_parse("RETENTION_PERIOD_MS", config.retention_period_ms);

        if let Ok(raw) = std::env::var("TRUSTED_IPS") {
            for ip in raw.split(',') {
                let ip = ip.trim();
                if !ip.is_empty() && !config.trusted_ips.iter().any(|known| known == ip) {
                    config.trusted_ips.push(ip.to_string());
                }
            }
        }

        if let Ok(url) = std::env::var("SECURITY_ALERT_WEBHOOK") {
            let url = url.trim();
            if !url.is_empty() {
                config.alert_webhook = Some(url.to_string());
            }
        }

        config
    }

    pub fn lockout_duration(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.lockout_duration_ms)
    }

    pub fn brute_force_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.brute_force_window_ms)
    }

    pub fn retention_period(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.retention_period_ms)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn webhook_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.webhook_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(
            serde_json::to_value(EventType::SqlInjection).unwrap(),
            json!("sql_injection")
        );
        assert_eq!(
            serde_json::to_value(EventType::BruteForceAttempt).unwrap(),
            json!("brute_force_attempt")
        );
        assert_eq!(EventType::IpBlocked.as_str(), "ip_blocked");
    }

    #[test]
    fn test_severity_ordering_and_wire_format() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(serde_json::to_value(Severity::Critical).unwrap(), json!("critical"));
        assert_eq!(Severity::High.to_string(), "high");
    }

    #[test]
    fn test_event_defaults_derive_from_type() {
        let event = SecurityEvent::new(
            EventType::CommandInjection,
            Some("198.51.100.4".to_string()),
            json!({"pattern": "shell_chain"}),
            None,
        );
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.description, "Command injection pattern detected in request");
        assert_eq!(event.source_ip.as_deref(), Some("198.51.100.4"));
    }

    #[test]
    fn test_event_builders_override_defaults() {
        let event = SecurityEvent::new(EventType::Other, None, json!({}), None)
            .with_severity(Severity::Medium)
            .with_description("custom probe");
        assert_eq!(event.severity, Severity::Medium);
        assert_eq!(event.description, "custom probe");
    }

    #[test]
    fn test_snapshot_header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), "sqlmap/1.7".to_string());
        headers.insert("CF-IPCountry".to_string(), "PE".to_string());
        let snapshot = RequestSnapshot {
            headers,
            ..Default::default()
        };
        assert_eq!(snapshot.user_agent(), Some("sqlmap/1.7"));
        assert_eq!(snapshot.geo_hint(), Some("PE"));
        assert_eq!(snapshot.content_type(), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = SecurityConfig::default();
        assert_eq!(config.max_login_attempts, 5);
        assert_eq!(config.lockout_duration_ms, 1_800_000);
        assert_eq!(config.brute_force_window_ms, 300_000);
        assert_eq!(config.suspicious_activity_threshold, 10);
        assert_eq!(config.retention_period_ms, 604_800_000);
        assert!(config.trusted_ips.is_empty());
        assert!(config.alert_webhook.is_none());
    }

    #[test]
    fn test_config_from_env_falls_back_on_garbage() {
        std::env::set_var("MAX_LOGIN_ATTEMPTS", "3");
        std::env::set_var("SUSPICIOUS_ACTIVITY_THRESHOLD", "not-a-number");
        std::env::set_var("TRUSTED_IPS", "10.0.0.1, 10.0.0.2,,10.0.0.1");
        std::env::set_var("SECURITY_ALERT_WEBHOOK", "   ");

        let config = SecurityConfig::from_env();
        assert_eq!(config.max_login_attempts, 3);
        assert_eq!(config.suspicious_activity_threshold, 10);
        assert_eq!(
            config.trusted_ips,
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
        );
        assert!(config.alert_webhook.is_none());

        std::env::remove_var("MAX_LOGIN_ATTEMPTS");
        std::env::remove_var("SUSPICIOUS_ACTIVITY_THRESHOLD");
        std::env::remove_var("TRUSTED_IPS");
        std::env::remove_var("SECURITY_ALERT_WEBHOOK");
    }
}
