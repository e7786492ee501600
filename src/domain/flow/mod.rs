//! Flow module - declarative step graphs and their registry.

mod definition;
mod errors;
mod expectation;
mod registry;
mod template;
mod validation;

pub use definition::{FlowDefinition, Step, StepKind, Transition};
pub use errors::{FlowError, ValidationProblem};
pub use expectation::{InputExpectation, InputMismatchError};
pub use registry::FlowRegistry;
pub use template::render;
pub use validation::validate_flow;
