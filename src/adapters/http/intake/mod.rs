//! HTTP intake for the engine's two entry points.
//!
//! - `POST /events/inbound` - normalized inbound message, enqueued as a `process_event` job
//! - `POST /callbacks` - signed external callback, enqueued as a `process_callback` job
//! - `GET /health` - liveness probe

pub mod dto;
mod handlers;
mod routes;
pub mod signature;

pub use handlers::{IntakeError, IntakeState};
pub use routes::{intake_router, intake_routes};
pub use signature::{CallbackVerifier, SignatureError};
