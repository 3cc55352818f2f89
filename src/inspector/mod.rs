// Exportar componentes principales
pub mod catalog;
pub mod scan;

pub use catalog::{PatternCatalog, ThreatCategory, ThreatPattern, SCANNER_USER_AGENTS};
pub use scan::RequestInspector;
