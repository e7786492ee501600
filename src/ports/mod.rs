//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the engine and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `SessionRepository` - Optimistically-versioned session store plus the
//!   correlation index
//! - `OutboxStore` - Post-commit side effects committed with each turn
//! - `ContactLock` - Per-contact lease shared by all workers
//! - `InvocationLog` - Deduplication of action invocations
//! - `OrderStore` - Orders created by flows
//!
//! ## Delivery and Integration Ports
//!
//! - `TaskQueue` - Scheduled, at-least-once job execution
//! - `MessageSender` - Outbound messages to the channel
//! - `PaymentGateway`, `CatalogGateway` - External APIs used by actions
//! - `ActionHandler` - Common interface of every action

mod action_handler;
mod contact_lock;
mod gateways;
mod invocation_log;
mod message_sender;
mod order_store;
mod outbox_store;
mod session_repository;
mod task_queue;

pub use action_handler::{ActionHandler, ActionRequest};
pub use contact_lock::{ContactLock, LeaseGrant};
pub use gateways::{CatalogGateway, GatewayError, PaymentGateway, PaymentInitiation, PaymentRequest};
pub use invocation_log::{InvocationLog, InvocationRecord, SaveResult};
pub use message_sender::MessageSender;
pub use order_store::{NewOrder, Order, OrderStore};
pub use outbox_store::{OutboxEffect, OutboxEntry, OutboxStatus, OutboxStore};
pub use session_repository::{
    CorrelationChange, CorrelationRecord, SessionCommit, SessionRepository,
};
pub use task_queue::TaskQueue;
