//! In-memory adapters.
//!
//! Every port has an in-process implementation here. They back the test
//! suite and the `memory` storage backend used for local development.

mod contact_lock;
mod gateways;
mod invocation_log;
mod messaging;
mod order_store;
mod session_store;
mod task_queue;

pub use contact_lock::InMemoryContactLock;
pub use gateways::{MockPaymentGateway, StaticCatalog};
pub use invocation_log::InMemoryInvocationLog;
pub use messaging::{LoggingMessageSender, RecordingMessageSender, SentMessage};
pub use order_store::InMemoryOrderStore;
pub use session_store::InMemorySessionStore;
pub use task_queue::InMemoryTaskQueue;
