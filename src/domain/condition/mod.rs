//! Condition evaluator - branch predicates over session variables and events.

mod predicate;

pub use predicate::{loosely_equal, Predicate, Scope};
