use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::webhook::WebhookAlerter;
use crate::{EventType, SecurityEvent, Severity};

/// Tipos de evento que siempre generan alerta, sin importar la severidad.
pub const CRITICAL_EVENT_TYPES: &[EventType] = &[
    EventType::CommandInjection,
    EventType::SqlInjection,
    EventType::BruteForceAttempt,
    EventType::IpBlocked,
];

/// Despachador de alertas: log local siempre, webhook si está configurado.
///
/// El envío al webhook corre en una tarea aparte para no retrasar el camino
/// de registro del evento.
pub struct AlertDispatcher {
    webhook: Option<Arc<WebhookAlerter>>,
    dispatched: AtomicU64,
}

impl AlertDispatcher {
    pub fn new(webhook: Option<WebhookAlerter>) -> Self {
        Self {
            webhook: webhook.map(Arc::new),
            dispatched: AtomicU64::new(0),
        }
    }

    /// Decide si un evento merece alerta.
    pub fn is_alertable(event: &SecurityEvent) -> bool {
        CRITICAL_EVENT_TYPES.contains(&event.event_type)
            || event.severity == Severity::Critical
    }

    /// Evalúa un evento recién registrado y despacha la alerta si aplica.
    pub fn check_for_alerts(&self, event: &SecurityEvent) {
        if !Self::is_alertable(event) {
            return;
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        warn!(
            event_type = event.event_type.as_str(),
            severity = event.severity.as_str(),
            source_ip = event.source_ip.as_deref().unwrap_or("unknown"),
            "SECURITY ALERT: {}",
            event.description
        );
        if let Some(webhook) = &self.webhook {
            let webhook = Arc::clone(webhook);
            let event = event.clone();
            tokio::spawn(async move {
                webhook.send(&event).await;
            });
        }
    }

    pub fn has_webhook(&self) -> bool {
        self.webhook.is_some()
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}
