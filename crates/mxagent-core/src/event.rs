//! Agent events
//!
//! Facts emitted by the registries and connection managers after a state
//! change succeeded. Consumers (gateways, audit logging, tests) subscribe via
//! the [`EventBus`](crate::event_bus::EventBus).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;

/// Events serialize with a `type` field carrying the snake_case variant name:
/// ```json
/// { "type": "attribute_bound", "resource": "host1", "attribute": "cpuLoad", ... }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    // ════════════════════════════════════════════════════════════════════════
    // RESOURCES
    // ════════════════════════════════════════════════════════════════════════
    ResourceAttached {
        resource: String,
    },

    /// All attributes and notifications of a resource were released
    ResourceDetached {
        resource: String,
        attributes: usize,
        notifications: usize,
    },

    // ════════════════════════════════════════════════════════════════════════
    // FEATURES
    // ════════════════════════════════════════════════════════════════════════
    AttributeBound {
        resource: String,
        attribute: String,
        canonical_type: String,
        /// True when an existing binding was replaced in place
        replaced: bool,
    },

    AttributeUnbound {
        resource: String,
        attribute: String,
    },

    NotificationEnabled {
        resource: String,
        name: String,
        category: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    NotificationDisabled {
        resource: String,
        name: String,
        category: String,
    },

    // ════════════════════════════════════════════════════════════════════════
    // CONNECTIONS
    // ════════════════════════════════════════════════════════════════════════
    ConnectionStateChanged {
        endpoint: String,
        from: ConnectionState,
        to: ConnectionState,
        at: DateTime<Utc>,
    },

    /// Native listener bindings re-applied after a reconnect
    ListenersReplayed {
        endpoint: String,
        count: usize,
    },

    // ════════════════════════════════════════════════════════════════════════
    // DELIVERY
    // ════════════════════════════════════════════════════════════════════════
    ListenerFailed {
        category: String,
        error: String,
    },
}

impl AgentEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ResourceAttached { .. } => "resource_attached",
            Self::ResourceDetached { .. } => "resource_detached",
            Self::AttributeBound { .. } => "attribute_bound",
            Self::AttributeUnbound { .. } => "attribute_unbound",
            Self::NotificationEnabled { .. } => "notification_enabled",
            Self::NotificationDisabled { .. } => "notification_disabled",
            Self::ConnectionStateChanged { .. } => "connection_state_changed",
            Self::ListenersReplayed { .. } => "listeners_replayed",
            Self::ListenerFailed { .. } => "listener_failed",
        }
    }

    /// Resource the event concerns, if any.
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::ResourceAttached { resource }
            | Self::ResourceDetached { resource, .. }
            | Self::AttributeBound { resource, .. }
            | Self::AttributeUnbound { resource, .. }
            | Self::NotificationEnabled { resource, .. }
            | Self::NotificationDisabled { resource, .. } => Some(resource),
            _ => None,
        }
    }

    pub fn is_connection_event(&self) -> bool {
        matches!(
            self,
            Self::ConnectionStateChanged { .. } | Self::ListenersReplayed { .. }
        )
    }
}
