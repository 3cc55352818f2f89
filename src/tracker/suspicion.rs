use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::EventType;

/// Peso que cada tipo de actividad aporta al puntaje acumulado.
static ACTIVITY_WEIGHTS: Lazy<HashMap<EventType, i64>> = Lazy::new(|| {
    let mut weights = HashMap::new();
    weights.insert(EventType::FailedLogin, 2);
    weights.insert(EventType::BruteForceAttempt, 20);
    weights.insert(EventType::SqlInjection, 5);
    weights.insert(EventType::CommandInjection, 8);
    weights.insert(EventType::Xss, 4);
    weights.insert(EventType::PathTraversal, 4);
    weights.insert(EventType::SuspiciousUserAgent, 2);
    weights.insert(EventType::SuspiciousContentType, 1);
    weights
});

const DEFAULT_ACTIVITY_WEIGHT: i64 = 1;

/// Historial de actividad sospechosa de una IP.
///
/// El puntaje solo crece; no hay decaimiento por tiempo. El registro completo
/// desaparece con el barrido de retención o con un desbloqueo explícito.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspicionRecord {
    pub activity_counts: HashMap<EventType, u64>,
    pub total_score: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Resultado de registrar una actividad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspicionUpdate {
    pub total_score: i64,
    pub over_threshold: bool,
}

/// Acumulador de puntajes de sospecha por IP de origen.
pub struct SuspicionTracker {
    records: Arc<RwLock<HashMap<String, SuspicionRecord>>>,
    threshold: i64,
}

impl SuspicionTracker {
    pub fn new(threshold: i64) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            threshold,
        }
    }

    /// Peso asignado a un tipo de actividad.
    pub fn weight_for(event_type: EventType) -> i64 {
        ACTIVITY_WEIGHTS
            .get(&event_type)
            .copied()
            .unwrap_or(DEFAULT_ACTIVITY_WEIGHT)
    }

    /// Suma la actividad al registro de la IP y reporta si el puntaje
    /// alcanzó el umbral.
    pub fn record_activity(&self, source_ip: &str, event_type: EventType) -> SuspicionUpdate {
        let now = Utc::now();
        let mut records = self.records.write().unwrap();
        let record = records
            .entry(source_ip.to_string())
            .or_insert_with(|| SuspicionRecord {
                activity_counts: HashMap::new(),
                total_score: 0,
                first_seen: now,
                last_seen: now,
            });

        *record.activity_counts.entry(event_type).or_insert(0) += 1;
        record.total_score += Self::weight_for(event_type);
        record.last_seen = now;

        debug!(
            source_ip = source_ip,
            activity = event_type.as_str(),
            total_score = record.total_score,
            "Suspicious activity recorded"
        );

        SuspicionUpdate {
            total_score: record.total_score,
            over_threshold: record.total_score >= self.threshold,
        }
    }

    /// Puntaje actual de una IP, cero si no está registrada.
    pub fn score(&self, source_ip: &str) -> i64 {
        self.records
            .read()
            .unwrap()
            .get(source_ip)
            .map(|record| record.total_score)
            .unwrap_or(0)
    }

    pub fn record(&self, source_ip: &str) -> Option<SuspicionRecord> {
        self.records.read().unwrap().get(source_ip).cloned()
    }

    /// Elimina el registro completo de la IP. Devuelve si existía.
    pub fn remove(&self, source_ip: &str) -> bool {
        self.records.write().unwrap().remove(source_ip).is_some()
    }

    pub fn tracked_count(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Copia de todos los registros, para exportación.
    pub fn snapshot(&self) -> HashMap<String, SuspicionRecord> {
        self.records.read().unwrap().clone()
    }

    /// Elimina registros sin actividad desde el corte. Devuelve cuántos cayeron.
    pub fn cleanup_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.records.write().unwrap();
        let before = records.len();
        records.retain(|_, record| record.last_seen > cutoff);
        before - records.len()
    }
}
