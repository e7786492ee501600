//! Application layer - the engine and its background workers.
//!
//! This layer orchestrates domain operations and coordinates between ports:
//! the interpreter advances a session by one event, the engine wraps turns in
//! leases and optimistic commits, and the workers drain the task queue, the
//! outbox and idle sessions.

pub mod action_executor;
pub mod action_registry;
pub mod concurrency_guard;
pub mod correlator;
pub mod engine;
pub mod errors;
pub mod idle_sweeper;
pub mod interpreter;
pub mod jobs;
pub mod outbox_relay;
pub mod worker_pool;

pub use action_executor::{ActionExecutor, ExecutorSettings};
pub use action_registry::ActionRegistry;
pub use concurrency_guard::{ConcurrencyGuard, GuardError, GuardSettings, Lease};
pub use correlator::{Correlation, ExternalEventCorrelator};
pub use engine::{Disposition, EngineSettings, FlowEngine, UnchangedReason};
pub use errors::EngineError;
pub use idle_sweeper::{IdleSweeper, IdleSweeperConfig, SweepReport};
pub use interpreter::{Interpreter, InterpreterSettings, Turn};
pub use jobs::{JobHandler, JobRegistry, ProcessCallbackHandler, ProcessEventHandler};
pub use outbox_relay::{OutboxRelay, OutboxRelayConfig};
pub use worker_pool::{JobOutcome, WorkerPool, WorkerPoolConfig};
