//! Notification integration tests
//!
//! Fan-out, listener failure isolation, filters and delivery modes.

mod delivery;
