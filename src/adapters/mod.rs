//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the engine to external systems:
//! - `memory` - In-process implementations of every port (tests, local runs)
//! - `actions` - One `ActionHandler` per action variant
//! - `postgres` - Sessions, outbox, leases, invocation log, orders
//! - `redis` - Task queue
//! - `gateway` - Messaging, payment and catalog clients over HTTP
//! - `http` - Intake endpoints for inbound events and callbacks

pub mod actions;
pub mod gateway;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod redis;
