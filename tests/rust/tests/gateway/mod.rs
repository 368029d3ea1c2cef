//! Gateway integration tests
//!
//! The REST router end to end, and several front-ends sharing one agent.

mod rest_api;
