//! HTTP API surface
//!
//! Session lifecycle, SSE progress streaming, health, and collection
//! browsing. File upload handling and rendering live with the UI
//! collaborator; only the session-facing verbs are served here.

pub mod browse;
pub mod error;
pub mod health;
pub mod sessions;
pub mod sse;

pub use browse::browse_routes;
pub use health::health_routes;
pub use sessions::session_routes;
pub use sse::session_event_stream;
