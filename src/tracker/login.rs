use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Intento individual dentro de la ventana deslizante.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// Estado acumulado de un par identificador + IP de origen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginLockState {
    pub attempts: VecDeque<LoginAttempt>,
    pub locked: bool,
    pub lock_expiry: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
}

/// Veredicto devuelto al llamador por cada intento registrado.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginAttemptOutcome {
    pub allowed: bool,
    pub reason: Option<String>,
    pub lock_expiry: Option<DateTime<Utc>>,
    pub remaining_attempts: Option<u32>,
}

impl LoginAttemptOutcome {
    fn allowed(remaining_attempts: Option<u32>) -> Self {
        Self {
            allowed: true,
            reason: None,
            lock_expiry: None,
            remaining_attempts,
        }
    }

    fn locked(lock_expiry: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            reason: Some("locked".to_string()),
            lock_expiry: Some(lock_expiry),
            remaining_attempts: None,
        }
    }
}

/// Transición observable de un intento, para que el orquestador registre
/// los eventos que correspondan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoginSignal {
    FailedAttempt {
        failed_count: u32,
    },
    LockedOut {
        failed_count: u32,
        lock_expiry: DateTime<Utc>,
    },
}

/// Rastreador de intentos de login con ventana deslizante y bloqueo temporal.
///
/// Los bloqueos expiran de forma perezosa: nadie los levanta hasta el
/// siguiente intento del mismo par, momento en que el historial se reinicia.
pub struct LoginAttemptTracker {
    states: Arc<RwLock<HashMap<String, LoginLockState>>>,
    max_attempts: u32,
    window: Duration,
    lockout: Duration,
}

impl LoginAttemptTracker {
    pub fn new(max_attempts: u32, window: Duration, lockout: Duration) -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
            max_attempts,
            window,
            lockout,
        }
    }

    fn key(identifier: &str, source_ip: &str) -> String {
        format!("{}:{}", identifier, source_ip)
    }

    /// Registra un intento y devuelve el veredicto más la transición
    /// observada, si la hubo.
    pub fn track(
        &self,
        identifier: &str,
        success: bool,
        source_ip: &str,
    ) -> (LoginAttemptOutcome, Option<LoginSignal>) {
        let now = Utc::now();
        let key = Self::key(identifier, source_ip);
        let mut states = self.states.write().unwrap();
        let state = states.entry(key).or_insert_with(|| LoginLockState {
            attempts: VecDeque::new(),
            locked: false,
            lock_expiry: None,
            last_seen: now,
        });
        state.last_seen = now;

        if state.locked {
            match state.lock_expiry {
                Some(expiry) if now < expiry => {
                    debug!(
                        identifier = identifier,
                        source_ip = source_ip,
                        "Login attempt rejected while locked"
                    );
                    return (LoginAttemptOutcome::locked(expiry), None);
                }
                _ => {
                    // Expiración perezosa: el historial arranca de cero
                    state.attempts.clear();
                    state.locked = false;
                    state.lock_expiry = None;
                }
            }
        }

        state.attempts.push_back(LoginAttempt {
            timestamp: now,
            success,
        });
        let cutoff = now - self.window;
        while let Some(front) = state.attempts.front() {
            if front.timestamp < cutoff {
                state.attempts.pop_front();
            } else {
                break;
            }
        }

        let failed_count = state.attempts.iter().filter(|a| !a.success).count() as u32;

        if failed_count >= self.max_attempts {
            let expiry = now + self.lockout;
            state.locked = true;
            state.lock_expiry = Some(expiry);
            warn!(
                identifier = identifier,
                source_ip = source_ip,
                failed_count = failed_count,
                "Login lockout triggered"
            );
            return (
                LoginAttemptOutcome::locked(expiry),
                Some(LoginSignal::LockedOut {
                    failed_count,
                    lock_expiry: expiry,
                }),
            );
        }

        if success {
            (LoginAttemptOutcome::allowed(None), None)
        } else {
            (
                LoginAttemptOutcome::allowed(Some(self.max_attempts - failed_count)),
                Some(LoginSignal::FailedAttempt { failed_count }),
            )
        }
    }

    pub fn state(&self, identifier: &str, source_ip: &str) -> Option<LoginLockState> {
        let key = Self::key(identifier, source_ip);
        self.states.read().unwrap().get(&key).cloned()
    }

    pub fn tracked_count(&self) -> usize {
        self.states.read().unwrap().len()
    }

    /// Pares actualmente bloqueados, descontando expiraciones pendientes.
    pub fn locked_count(&self) -> usize {
        let now = Utc::now();
        self.states
            .read()
            .unwrap()
            .values()
            .filter(|state| {
                state.locked && state.lock_expiry.map(|expiry| now < expiry).unwrap_or(true)
            })
            .count()
    }

    /// Copia de todos los estados, para exportación.
    pub fn snapshot(&self) -> HashMap<String, LoginLockState> {
        self.states.read().unwrap().clone()
    }

    /// Elimina estados sin actividad desde el corte. Devuelve cuántos cayeron.
    pub fn cleanup_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let mut states = self.states.write().unwrap();
        let before = states.len();
        states.retain(|_, state| state.last_seen > cutoff);
        before - states.len()
    }
}
