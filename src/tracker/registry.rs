use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Direcciones siempre confiables, nunca bloqueables.
const LOOPBACK_ADDRS: &[&str] = &["127.0.0.1", "::1"];

/// Resultado de un intento de bloqueo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// La IP entró al conjunto de bloqueadas.
    Blocked,
    /// Ya estaba bloqueada; no se repite el efecto.
    AlreadyBlocked,
    /// IP confiable; la operación se ignora.
    Trusted,
}

/// Registro de IPs bloqueadas con lista de confianza inmutable.
///
/// La lista de confianza se fija al construir el registro; el conjunto de
/// bloqueadas es el único estado mutable.
pub struct IpBlockRegistry {
    blocked: Arc<RwLock<HashSet<String>>>,
    trusted: HashSet<String>,
}

impl IpBlockRegistry {
    pub fn new(trusted_ips: &[String]) -> Self {
        let mut trusted: HashSet<String> =
            LOOPBACK_ADDRS.iter().map(|ip| ip.to_string()).collect();
        trusted.extend(trusted_ips.iter().cloned());
        Self {
            blocked: Arc::new(RwLock::new(HashSet::new())),
            trusted,
        }
    }

    pub fn is_trusted(&self, ip: &str) -> bool {
        self.trusted.contains(ip)
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.blocked.read().unwrap().contains(ip)
    }

    /// Intenta bloquear una IP. Confiables e idempotencia se resuelven acá.
    pub fn block(&self, ip: &str) -> BlockOutcome {
        if self.is_trusted(ip) {
            warn!(ip = ip, "Refusing to block trusted IP");
            return BlockOutcome::Trusted;
        }
        let mut blocked = self.blocked.write().unwrap();
        if blocked.insert(ip.to_string()) {
            info!(ip = ip, "IP added to block list");
            BlockOutcome::Blocked
        } else {
            BlockOutcome::AlreadyBlocked
        }
    }

    /// Quita una IP del conjunto de bloqueadas. Devuelve si estaba.
    pub fn unblock(&self, ip: &str) -> bool {
        self.blocked.write().unwrap().remove(ip)
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.read().unwrap().len()
    }

    pub fn trusted_count(&self) -> usize {
        self.trusted.len()
    }

    /// Lista ordenada de IPs bloqueadas, para exportación.
    pub fn blocked_snapshot(&self) -> Vec<String> {
        let mut ips: Vec<String> = self.blocked.read().unwrap().iter().cloned().collect();
        ips.sort();
        ips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_and_unblock_membership() {
        let registry = IpBlockRegistry::new(&[]);
        assert!(!registry.is_blocked("203.0.113.30"));
        assert_eq!(registry.block("203.0.113.30"), BlockOutcome::Blocked);
        assert!(registry.is_blocked("203.0.113.30"));
        assert!(registry.unblock("203.0.113.30"));
        assert!(!registry.is_blocked("203.0.113.30"));
        assert!(!registry.unblock("203.0.113.30"));
    }

    #[test]
    fn test_block_is_idempotent() {
        let registry = IpBlockRegistry::new(&[]);
        assert_eq!(registry.block("203.0.113.31"), BlockOutcome::Blocked);
        assert_eq!(registry.block("203.0.113.31"), BlockOutcome::AlreadyBlocked);
        assert_eq!(registry.blocked_count(), 1);
    }

    #[test]
    fn test_loopback_is_always_trusted() {
        let registry = IpBlockRegistry::new(&[]);
        assert!(registry.is_trusted("127.0.0.1"));
        assert!(registry.is_trusted("::1"));
        assert_eq!(registry.block("127.0.0.1"), BlockOutcome::Trusted);
        assert_eq!(registry.block("::1"), BlockOutcome::Trusted);
        assert_eq!(registry.blocked_count(), 0);
    }

    #[test]
    fn test_configured_trusted_ips_cannot_be_blocked() {
        let registry = IpBlockRegistry::new(&["198.51.100.40".to_string()]);
        assert!(registry.is_trusted("198.51.100.40"));
        assert_eq!(registry.block("198.51.100.40"), BlockOutcome::Trusted);
        assert!(!registry.is_blocked("198.51.100.40"));
        // Una IP cualquiera sí se bloquea
        assert_eq!(registry.block("198.51.100.41"), BlockOutcome::Blocked);
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let registry = IpBlockRegistry::new(&[]);
        registry.block("203.0.113.9");
        registry.block("203.0.113.1");
        registry.block("203.0.113.5");
        assert_eq!(
            registry.blocked_snapshot(),
            vec![
                "203.0.113.1".to_string(),
                "203.0.113.5".to_string(),
                "203.0.113.9".to_string(),
            ]
        );
    }
}
