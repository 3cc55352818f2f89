// Exportar componentes principales
pub mod login;
pub mod registry;
pub mod suspicion;

pub use login::{LoginAttempt, LoginAttemptOutcome, LoginAttemptTracker, LoginLockState, LoginSignal};
pub use registry::{BlockOutcome, IpBlockRegistry};
pub use suspicion::{SuspicionRecord, SuspicionTracker, SuspicionUpdate};
