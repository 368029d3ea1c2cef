//! Connection Management
//!
//! - **ConnectionState**: `Disconnected -> Connecting -> Connected ->
//!   (Degraded -> Reconnecting -> Connected) | Disconnected`
//! - **RetryPolicy**: bounded backoff for reconnects
//! - **ConnectionManager**: owns one back-end connection, reconnects on
//!   demand and replays native listener bindings before reporting Connected
//! - **ConnectionSettings**: the configured policy shared by every manager
//!   an agent hands out

mod manager;
mod policy;
mod settings;
mod state;

pub use manager::{ConnectionFactory, ConnectionManager, ListenerBinding};
pub use policy::RetryPolicy;
pub use settings::ConnectionSettings;
pub use state::ConnectionState;
