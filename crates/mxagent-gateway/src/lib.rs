//! mxagent Gateway
//!
//! Protocol front-ends over the virtualization layer:
//! - Gateway contract shared by every front-end (`contract`)
//! - REST over HTTP with server-sent notification streams
//! - JMX-style MBean view with OpenType values
//! - Command-style grammar for chat/CLI channels

pub mod command;
pub mod contract;
pub mod jmx;
pub mod logging;
pub mod rest;
pub mod server;

pub use command::{Command, CommandError, CommandExecutor, OutputFormat, Reply};
pub use contract::{JsonCodec, NotificationStream, ResourceGateway, WireCodec};
pub use jmx::{JmxCodec, JmxGateway, JmxNotification, MBeanInfo};
pub use logging::init_logging;
pub use rest::{Access, AccessGuard, AllowAll, ApiError, RestState, SharedAccessGuard};
pub use server::{GatewayConfig, GatewayServer};
