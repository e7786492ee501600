//! Convoflow - Conversational Flow Engine
//!
//! Drives multi-step automated conversations over messaging channels. Flows
//! are declarative step graphs; each contact has at most one live session
//! that advances one event at a time under a per-contact lease, suspends on
//! asynchronous actions and resumes when the matching callback arrives.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
