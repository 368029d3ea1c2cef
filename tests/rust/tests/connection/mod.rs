//! Connection manager integration tests

mod reconnect;
