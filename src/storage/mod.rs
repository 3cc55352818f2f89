// Exportar componentes principales
pub mod events;

pub use events::{EventQuery, SecurityEventStore};
