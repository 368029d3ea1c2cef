//! Attribute registry integration tests
//!
//! Binding lifecycle, concurrent access during rebinds, timeouts and
//! identifier rules, driven through the agent.

mod binding;
mod identifiers;
