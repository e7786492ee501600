//! HTTP adapters - REST API exposed to channel connectors and gateways.

pub mod intake;

pub use intake::{intake_router, CallbackVerifier, IntakeState};
