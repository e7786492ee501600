//! Domain layer containing the engine's business types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (ids, timestamps, statuses, errors)
//! - `flow` - Flow definitions, validation and the flow registry
//! - `condition` - Transition predicates and their evaluation
//! - `session` - Session aggregate, variables, events, outbound messages
//! - `action` - Action declarations, results and retry policy
//! - `job` - Background job records

pub mod action;
pub mod condition;
pub mod flow;
pub mod foundation;
pub mod job;
pub mod session;
