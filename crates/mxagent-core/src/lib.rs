//! # mxagent Core Library
//!
//! Attribute/notification virtualization and type bridging for the agent.
//!
//! ## Modules
//!
//! - `types` - Canonical type system: types, values, projections
//! - `bridge` - JSON and OpenType wire bridges
//! - `identifier` - Composite `(resource, name)` identifiers
//! - `attributes` - Attribute registry over connector accessors
//! - `notifications` - Notification registry, subscriptions, listener invocation
//! - `connector` - Capability traits connectors implement, plus an in-memory connector
//! - `connection` - Connection manager with reconnect and listener replay
//! - `agent` - Composition root attaching resources to both registries
//! - `config` - JSON configuration
//! - `event_bus` - Agent event distribution

pub mod agent;
pub mod attributes;
pub mod bridge;
pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod identifier;
pub mod license;
pub mod notifications;
pub mod options;
pub mod types;

pub use agent::{Agent, AgentBuilder};
pub use attributes::{AttributeDescriptor, AttributeRegistry};
pub use bridge::{JsonBridge, OpenTypeBridge, TypeBridge};
pub use config::AgentConfig;
pub use connection::{
    ConnectionFactory, ConnectionManager, ConnectionSettings, ConnectionState, ListenerBinding,
    RetryPolicy,
};
pub use connector::{
    AttributeAccessor, AttributeSource, Connector, ListenerControl, NotificationDeclaration,
    NotificationSource, SharedAccessor,
};
pub use error::{AgentError, Result, TypeError};
pub use event::AgentEvent;
pub use event_bus::{EventBus, EventReceiver, EventSender, SharedEventBus};
pub use identifier::{CompositeId, IdScheme};
pub use license::{Feature, LicensePolicy, MaxFeatures, Unlimited};
pub use notifications::{
    InvocationMode, InvocationReport, ListenerInvoker, Notification, NotificationFilter,
    NotificationListener, NotificationMetadata, NotificationRegistry, Severity, SharedListener,
    SubscriptionHandle,
};
pub use options::Options;
pub use types::{AttributeValue, CanonicalType, Column, MapType, MapValue, TableType, Value};
