// Exportar componentes principales
pub mod dispatcher;
pub mod webhook;

pub use dispatcher::{AlertDispatcher, CRITICAL_EVENT_TYPES};
pub use webhook::WebhookAlerter;
