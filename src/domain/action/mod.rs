//! Action module - the closed set of side-effecting actions a flow can run.
//!
//! Actions are declared on action steps as tagged variants (`ActionSpec`),
//! dispatched through a lookup table built at startup, and report back an
//! `ActionResult` or an `ActionError`.

mod descriptor;
mod result;
mod retry;
mod spec;

pub use descriptor::{ActionDescriptor, IdempotencyStrategy, SideEffectCategory};
pub use result::{ActionError, ActionResult};
pub use retry::RetryPolicy;
pub use spec::{ActionKind, ActionSpec, ActionType};
