use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerting::{AlertDispatcher, WebhookAlerter};
use crate::inspector::{PatternCatalog, RequestInspector};
use crate::storage::{EventQuery, SecurityEventStore};
use crate::tracker::{
    BlockOutcome, IpBlockRegistry, LoginAttemptOutcome, LoginAttemptTracker, LoginLockState,
    LoginSignal, SuspicionRecord, SuspicionTracker,
};
use crate::{
    EventType, RequestContext, RequestSnapshot, SecurityConfig, SecurityEvent, Severity,
    ThreatFinding,
};

/// Instantánea completa del estado del motor dentro de una ventana temporal.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityExport {
    pub generated_at: DateTime<Utc>,
    pub time_window_ms: i64,
    pub events: Vec<SecurityEvent>,
    pub suspicion_records: HashMap<String, SuspicionRecord>,
    pub blocked_ips: Vec<String>,
    pub login_states: HashMap<String, LoginLockState>,
}

/// Métricas agregadas del motor.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityMetrics {
    pub generated_at: DateTime<Utc>,
    pub time_window_ms: i64,
    pub total_events: usize,
    pub events_by_type: HashMap<EventType, u64>,
    pub events_by_severity: HashMap<Severity, u64>,
    pub blocked_ip_count: usize,
    pub blocked_ips: Vec<String>,
    pub suspicious_ip_count: usize,
    pub suspicion_scores: HashMap<String, i64>,
    pub tracked_login_pairs: usize,
    pub locked_login_pairs: usize,
    pub alerts_dispatched: u64,
}

/// Resumen de un barrido de retención.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CleanupSummary {
    pub events_removed: usize,
    pub suspicion_records_removed: usize,
    pub login_states_removed: usize,
}

/// Orquestador del monitoreo de seguridad.
///
/// Es la única pieza con estado compartido entre los componentes: el
/// inspector detecta, los rastreadores acumulan y el motor decide cuándo un
/// hallazgo se convierte en evento, bloqueo o alerta. Se construye una sola
/// instancia y se inyecta donde haga falta.
pub struct SecurityMonitor {
    config: SecurityConfig,
    catalog: Arc<PatternCatalog>,
    inspector: RequestInspector,
    store: Arc<SecurityEventStore>,
    suspicion: Arc<SuspicionTracker>,
    registry: Arc<IpBlockRegistry>,
    logins: Arc<LoginAttemptTracker>,
    alerts: Arc<AlertDispatcher>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
    started_at: DateTime<Utc>,
}

impl SecurityMonitor {
    pub fn new(config: SecurityConfig) -> Result<Self> {
        let catalog = Arc::new(PatternCatalog::new());
        let inspector = RequestInspector::new(Arc::clone(&catalog));
        let store = Arc::new(SecurityEventStore::new());
        let suspicion = Arc::new(SuspicionTracker::new(config.suspicious_activity_threshold));
        let registry = Arc::new(IpBlockRegistry::new(&config.trusted_ips));
        let logins = Arc::new(LoginAttemptTracker::new(
            config.max_login_attempts,
            config.brute_force_window(),
            config.lockout_duration(),
        ));
        let webhook = match &config.alert_webhook {
            Some(url) => Some(WebhookAlerter::new(url.clone(), config.webhook_timeout())?),
            None => None,
        };
        let alerts = Arc::new(AlertDispatcher::new(webhook));

        Ok(Self {
            config,
            catalog,
            inspector,
            store,
            suspicion,
            registry,
            logins,
            alerts,
            cleanup_task: Mutex::new(None),
            started_at: Utc::now(),
        })
    }

    /// Construye el monitor con la configuración del entorno.
    pub fn from_env() -> Result<Self> {
        Self::new(SecurityConfig::from_env())
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Lanza la tarea periódica de retención.
    pub fn start(&self) {
        let mut guard = self.cleanup_task.lock().unwrap();
        if guard.is_some() {
            warn!("Cleanup task already running");
            return;
        }

        let store = Arc::clone(&self.store);
        let suspicion = Arc::clone(&self.suspicion);
        let logins = Arc::clone(&self.logins);
        let retention = self.config.retention_period();
        let period = self.config.cleanup_interval();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // El primer tick es inmediato; sobre un estado recién creado no
            // hay nada que barrer
            interval.tick().await;
            loop {
                interval.tick().await;
                let cutoff = Utc::now() - retention;
                let summary = run_retention_sweep(&store, &suspicion, &logins, cutoff).await;
                info!(
                    events_removed = summary.events_removed,
                    suspicion_records_removed = summary.suspicion_records_removed,
                    login_states_removed = summary.login_states_removed,
                    "Retention sweep finished"
                );
            }
        });
        *guard = Some(handle);
        info!(
            cleanup_interval_ms = self.config.cleanup_interval_ms,
            retention_period_ms = self.config.retention_period_ms,
            "Security monitor started"
        );
    }

    /// Detiene la tarea periódica. El estado en memoria queda intacto.
    pub fn stop(&self) {
        let handle = self.cleanup_task.lock().unwrap().take();
        match handle {
            Some(handle) => {
                handle.abort();
                info!("Security monitor stopped");
            }
            None => debug!("Security monitor was not running"),
        }
    }

    /// Inspección pura, sin efectos sobre el estado.
    pub fn detect_threats(&self, request: &RequestSnapshot) -> Vec<ThreatFinding> {
        self.inspector.detect_threats(request)
    }

    /// Inspecciona la petición y registra cada hallazgo como evento,
    /// alimentando además el puntaje de sospecha de la IP de origen.
    pub async fn inspect_request(&self, request: &RequestSnapshot) -> Vec<ThreatFinding> {
        let findings = self.inspector.detect_threats(request);
        if findings.is_empty() {
            return findings;
        }

        let source_ip = normalize_ip(&request.source_ip);
        let context = RequestContext::from_snapshot(request);
        for finding in &findings {
            let event = SecurityEvent::new(
                finding.event_type,
                source_ip.clone(),
                finding.details.clone(),
                Some(context.clone()),
            )
            .with_severity(finding.severity)
            .with_description(finding.description.clone());
            self.store_and_alert(event).await;

            if let Some(ip) = &source_ip {
                self.update_suspicious_activity(ip, finding.event_type).await;
            }
        }
        findings
    }

    /// Registra un evento arbitrario y devuelve su identificador.
    pub async fn record_event(
        &self,
        event_type: EventType,
        source_ip: Option<String>,
        details: Value,
        request_context: Option<RequestContext>,
    ) -> Uuid {
        let event = SecurityEvent::new(event_type, source_ip, details, request_context);
        self.store_and_alert(event).await
    }

    async fn store_and_alert(&self, event: SecurityEvent) -> Uuid {
        self.alerts.check_for_alerts(&event);
        self.store.record(event).await
    }

    /// Suma actividad sospechosa a una IP y aplica el bloqueo automático si
    /// el puntaje cruza el umbral y la IP no es confiable.
    pub async fn update_suspicious_activity(&self, source_ip: &str, event_type: EventType) {
        if source_ip.is_empty() {
            return;
        }
        let update = self.suspicion.record_activity(source_ip, event_type);
        if update.over_threshold && !self.registry.is_trusted(source_ip) {
            let reason = format!("suspicious activity score: {}", update.total_score);
            self.apply_block(source_ip, &reason, true).await;
        }
    }

    /// Bloqueo manual de una IP.
    pub async fn block_ip(&self, ip: &str, reason: &str) -> BlockOutcome {
        self.apply_block(ip, reason, false).await
    }

    async fn apply_block(&self, ip: &str, reason: &str, automatic: bool) -> BlockOutcome {
        let outcome = self.registry.block(ip);
        if outcome == BlockOutcome::Blocked {
            warn!(ip = ip, reason = reason, automatic = automatic, "IP blocked");
            self.record_event(
                EventType::IpBlocked,
                Some(ip.to_string()),
                json!({ "reason": reason, "automatic_block": automatic }),
                None,
            )
            .await;
        }
        outcome
    }

    /// Desbloquea la IP y borra su historial de sospecha: perdón completo.
    pub async fn unblock_ip(&self, ip: &str, reason: &str) -> bool {
        let removed = self.registry.unblock(ip);
        self.suspicion.remove(ip);
        if removed {
            info!(ip = ip, reason = reason, "IP unblocked and suspicion history purged");
            self.record_event(
                EventType::IpUnblocked,
                Some(ip.to_string()),
                json!({ "reason": reason }),
                None,
            )
            .await;
        } else {
            debug!(ip = ip, "Unblock requested for IP that was not blocked");
        }
        removed
    }

    pub fn is_ip_blocked(&self, ip: &str) -> bool {
        self.registry.is_blocked(ip)
    }

    pub fn suspicion_score(&self, ip: &str) -> i64 {
        self.suspicion.score(ip)
    }

    /// Registra un intento de login y emite los eventos que correspondan.
    pub async fn track_login_attempt(
        &self,
        identifier: &str,
        success: bool,
        source_ip: &str,
    ) -> LoginAttemptOutcome {
        let (outcome, signal) = self.logins.track(identifier, success, source_ip);
        match signal {
            Some(LoginSignal::LockedOut {
                failed_count,
                lock_expiry,
            }) => {
                self.record_event(
                    EventType::BruteForceAttempt,
                    Some(source_ip.to_string()),
                    json!({
                        "identifier": identifier,
                        "failed_count": failed_count,
                        "lock_expiry": lock_expiry,
                    }),
                    None,
                )
                .await;
                self.update_suspicious_activity(source_ip, EventType::BruteForceAttempt)
                    .await;
            }
            Some(LoginSignal::FailedAttempt { failed_count }) => {
                self.record_event(
                    EventType::FailedLogin,
                    Some(source_ip.to_string()),
                    json!({
                        "identifier": identifier,
                        "failed_count": failed_count,
                    }),
                    None,
                )
                .await;
                self.update_suspicious_activity(source_ip, EventType::FailedLogin)
                    .await;
            }
            None => {}
        }
        outcome
    }

    /// Consulta de eventos con filtros combinados.
    pub async fn query_events(&self, filters: &EventQuery) -> Vec<SecurityEvent> {
        self.store.query(filters).await
    }

    /// Exporta eventos de la ventana junto con el estado de los rastreadores.
    pub async fn export_all(&self, window: Duration) -> SecurityExport {
        SecurityExport {
            generated_at: Utc::now(),
            time_window_ms: window.num_milliseconds(),
            events: self.store.events_in_window(window).await,
            suspicion_records: self.suspicion.snapshot(),
            blocked_ips: self.registry.blocked_snapshot(),
            login_states: self.logins.snapshot(),
        }
    }

    /// Métricas agregadas sobre la ventana indicada.
    pub async fn get_metrics(&self, window: Duration) -> SecurityMetrics {
        let events = self.store.events_in_window(window).await;
        let mut events_by_type: HashMap<EventType, u64> = HashMap::new();
        let mut events_by_severity: HashMap<Severity, u64> = HashMap::new();
        for event in &events {
            *events_by_type.entry(event.event_type).or_insert(0) += 1;
            *events_by_severity.entry(event.severity).or_insert(0) += 1;
        }

        let suspicion_scores: HashMap<String, i64> = self
            .suspicion
            .snapshot()
            .into_iter()
            .map(|(ip, record)| (ip, record.total_score))
            .collect();
        let blocked_ips = self.registry.blocked_snapshot();

        SecurityMetrics {
            generated_at: Utc::now(),
            time_window_ms: window.num_milliseconds(),
            total_events: events.len(),
            events_by_type,
            events_by_severity,
            blocked_ip_count: blocked_ips.len(),
            blocked_ips,
            suspicious_ip_count: suspicion_scores.len(),
            suspicion_scores,
            tracked_login_pairs: self.logins.tracked_count(),
            locked_login_pairs: self.logins.locked_count(),
            alerts_dispatched: self.alerts.dispatched_count(),
        }
    }

    /// Barrido de retención bajo demanda.
    pub async fn run_cleanup(&self) -> CleanupSummary {
        let cutoff = Utc::now() - self.config.retention_period();
        run_retention_sweep(&self.store, &self.suspicion, &self.logins, cutoff).await
    }

    /// Estado de salud del motor en formato serializable.
    pub async fn health_check(&self) -> Value {
        let running = self.cleanup_task.lock().unwrap().is_some();
        let stored_events = self.store.len().await;
        json!({
            "status": "operational",
            "running": running,
            "uptime_seconds": (Utc::now() - self.started_at).num_seconds(),
            "stored_events": stored_events,
            "tracked_ips": self.suspicion.tracked_count(),
            "blocked_ips": self.registry.blocked_count(),
            "trusted_ips": self.registry.trusted_count(),
            "tracked_login_pairs": self.logins.tracked_count(),
            "pattern_categories": self.catalog.categories().len(),
            "total_patterns": self.catalog.pattern_count(),
            "alerts_dispatched": self.alerts.dispatched_count(),
        })
    }
}

/// Barrido de retención sobre los tres estados con historial propio.
///
/// Cada componente se barre por separado; un resultado vacío en uno no
/// impide continuar con los demás.
async fn run_retention_sweep(
    store: &SecurityEventStore,
    suspicion: &SuspicionTracker,
    logins: &LoginAttemptTracker,
    cutoff: DateTime<Utc>,
) -> CleanupSummary {
    CleanupSummary {
        events_removed: store.cleanup_events(cutoff).await,
        suspicion_records_removed: suspicion.cleanup_idle(cutoff),
        login_states_removed: logins.cleanup_idle(cutoff),
    }
}

fn normalize_ip(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
