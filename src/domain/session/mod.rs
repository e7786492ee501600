//! Session module - per-contact conversation state.
//!
//! - `Session` aggregate with its position in the flow and status lifecycle
//! - `VariableBag` of namespaced variables
//! - `Event` tagged union consumed by the interpreter
//! - `OutboundBody` messages staged for delivery

mod aggregate;
mod event;
mod outbound;
mod variables;

pub use aggregate::{Position, Session, Suspension};
pub use event::{Event, InboundMessage};
pub use outbound::{CatalogItem, OutboundBody};
pub use variables::{lookup_path, value_to_text, VariableBag};
