//! Session-keyed extraction pipeline

mod orchestrator;
mod registry;
mod session;

pub use orchestrator::{ExtractOptions, HealthReport, Orchestrator};
pub use registry::SessionRegistry;
pub use session::{ExtractionSession, SessionError, SessionSnapshot};
