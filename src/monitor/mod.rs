// Exportar componentes principales
pub mod engine;

pub use engine::{CleanupSummary, SecurityExport, SecurityMetrics, SecurityMonitor};
