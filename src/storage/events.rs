use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{EventType, SecurityEvent, Severity};

/// Filtros de consulta sobre el almacén de eventos.
///
/// Todos los filtros son opcionales salvo la ventana temporal; la consulta
/// por defecto cubre las últimas 24 horas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQuery {
    pub event_type: Option<EventType>,
    pub source_ip: Option<String>,
    pub severity: Option<Severity>,
    pub time_window_ms: i64,
    pub limit: usize,
    pub offset: usize,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            event_type: None,
            source_ip: None,
            severity: None,
            time_window_ms: 86_400_000,
            limit: 100,
            offset: 0,
        }
    }
}

/// Almacén de eventos en memoria, ordenado por llegada.
///
/// El crecimiento solo lo frena el barrido de retención; no hay desalojo por
/// capacidad, de modo que ningún evento dentro de la retención se pierde.
pub struct SecurityEventStore {
    events: Arc<RwLock<VecDeque<SecurityEvent>>>,
}

impl SecurityEventStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(VecDeque::new())),
        }
    }

    /// Inserta un evento y devuelve su identificador.
    pub async fn record(&self, event: SecurityEvent) -> Uuid {
        let id = event.id;
        let mut events = self.events.write().await;
        events.push_back(event);
        id
    }

    /// Consulta con filtros combinados, ordenada de más reciente a más
    /// antigua, con paginación por offset y limit.
    pub async fn query(&self, filters: &EventQuery) -> Vec<SecurityEvent> {
        let cutoff = Utc::now() - Duration::milliseconds(filters.time_window_ms);
        let events = self.events.read().await;
        let mut matched: Vec<SecurityEvent> = events
            .iter()
            .filter(|event| {
                event.timestamp >= cutoff
                    && filters
                        .event_type
                        .map_or(true, |wanted| event.event_type == wanted)
                    && filters
                        .source_ip
                        .as_deref()
                        .map_or(true, |wanted| event.source_ip.as_deref() == Some(wanted))
                    && filters
                        .severity
                        .map_or(true, |wanted| event.severity == wanted)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched
            .into_iter()
            .skip(filters.offset)
            .take(filters.limit)
            .collect()
    }

    /// Todos los eventos dentro de la ventana, de más reciente a más antiguo.
    pub async fn events_in_window(&self, window: Duration) -> Vec<SecurityEvent> {
        let cutoff = Utc::now() - window;
        let events = self.events.read().await;
        let mut matched: Vec<SecurityEvent> = events
            .iter()
            .filter(|event| event.timestamp >= cutoff)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched
    }

    /// Elimina los eventos anteriores al corte. Devuelve cuántos cayeron.
    pub async fn cleanup_events(&self, cutoff: DateTime<Utc>) -> usize {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|event| event.timestamp >= cutoff);
        let removed = before - events.len();
        if removed > 0 {
            debug!(removed = removed, "Expired events removed from store");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for SecurityEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: EventType, ip: &str) -> SecurityEvent {
        SecurityEvent::new(event_type, Some(ip.to_string()), json!({}), None)
    }

    #[tokio::test]
    async fn test_record_and_query_round_trip() {
        let store = SecurityEventStore::new();
        let id = store.record(event(EventType::Xss, "203.0.113.40")).await;
        let results = store.query(&EventQuery::default()).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_query_filters_by_type_ip_and_severity() {
        let store = SecurityEventStore::new();
        store.record(event(EventType::SqlInjection, "203.0.113.41")).await;
        store.record(event(EventType::Xss, "203.0.113.41")).await;
        store.record(event(EventType::SqlInjection, "203.0.113.42")).await;

        let by_type = store
            .query(&EventQuery {
                event_type: Some(EventType::SqlInjection),
                ..Default::default()
            })
            .await;
        assert_eq!(by_type.len(), 2);

        let by_ip = store
            .query(&EventQuery {
                source_ip: Some("203.0.113.41".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(by_ip.len(), 2);

        let combined = store
            .query(&EventQuery {
                event_type: Some(EventType::SqlInjection),
                source_ip: Some("203.0.113.41".to_string()),
                ..Default::default()
            })
            .await;
        assert_eq!(combined.len(), 1);

        let by_severity = store
            .query(&EventQuery {
                severity: Some(Severity::Critical),
                ..Default::default()
            })
            .await;
        assert!(by_severity.is_empty());
    }

    #[tokio::test]
    async fn test_query_returns_newest_first() {
        let store = SecurityEventStore::new();
        let mut old = event(EventType::FailedLogin, "203.0.113.43");
        old.timestamp = Utc::now() - Duration::minutes(10);
        let old_id = old.id;
        store.record(old).await;
        let fresh_id = store.record(event(EventType::FailedLogin, "203.0.113.43")).await;

        let results = store.query(&EventQuery::default()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, fresh_id);
        assert_eq!(results[1].id, old_id);
    }

    #[tokio::test]
    async fn test_time_window_excludes_old_events() {
        let store = SecurityEventStore::new();
        let mut stale = event(EventType::Xss, "203.0.113.44");
        stale.timestamp = Utc::now() - Duration::hours(2);
        store.record(stale).await;
        store.record(event(EventType::Xss, "203.0.113.44")).await;

        let last_hour = store
            .query(&EventQuery {
                time_window_ms: 3_600_000,
                ..Default::default()
            })
            .await;
        assert_eq!(last_hour.len(), 1);

        let in_window = store.events_in_window(Duration::hours(1)).await;
        assert_eq!(in_window.len(), 1);
        let in_wide_window = store.events_in_window(Duration::hours(3)).await;
        assert_eq!(in_wide_window.len(), 2);
    }

    #[tokio::test]
    async fn test_limit_and_offset_paginate() {
        let store = SecurityEventStore::new();
        for i in 0..10 {
            let mut e = event(EventType::FailedLogin, "203.0.113.45");
            e.timestamp = Utc::now() - Duration::seconds(10 - i);
            store.record(e).await;
        }

        let first_page = store
            .query(&EventQuery {
                limit: 4,
                ..Default::default()
            })
            .await;
        assert_eq!(first_page.len(), 4);

        let second_page = store
            .query(&EventQuery {
                limit: 4,
                offset: 4,
                ..Default::default()
            })
            .await;
        assert_eq!(second_page.len(), 4);
        assert!(first_page[3].timestamp >= second_page[0].timestamp);

        let tail = store
            .query(&EventQuery {
                limit: 4,
                offset: 8,
                ..Default::default()
            })
            .await;
        assert_eq!(tail.len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_events() {
        let store = SecurityEventStore::new();
        let mut expired = event(EventType::Other, "203.0.113.46");
        expired.timestamp = Utc::now() - Duration::days(8);
        store.record(expired).await;
        store.record(event(EventType::Other, "203.0.113.46")).await;

        let removed = store.cleanup_events(Utc::now() - Duration::days(7)).await;
        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);

        let removed_again = store.cleanup_events(Utc::now() - Duration::days(7)).await;
        assert_eq!(removed_again, 0);
    }
}
