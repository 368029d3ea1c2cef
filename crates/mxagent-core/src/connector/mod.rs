//! Connector Capabilities
//!
//! A connector exposes a managed resource through small capability traits
//! selected when the resource is attached:
//!
//! - **AttributeSource**: resolves attribute names to live accessors
//! - **NotificationSource**: enables notification categories and reports the
//!   endpoint that must be listened to
//! - **ListenerControl**: starts/stops native listening at an endpoint,
//!   usually backed by a [`ConnectionManager`](crate::connection::ConnectionManager)

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::notifications::{NotificationEmitter, Severity};
use crate::options::Options;
use crate::types::{AttributeValue, CanonicalType};

/// Connector-side handle for one bound attribute.
#[async_trait]
pub trait AttributeAccessor: Send + Sync {
    fn canonical_type(&self) -> &CanonicalType;

    fn is_readable(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool;

    async fn read(&self) -> Result<AttributeValue>;

    /// `value` already carries the accessor's canonical type.
    async fn write(&self, value: AttributeValue) -> Result<()>;

    /// Free connector resources. Called once, after the registry dropped
    /// the accessor and no operation is in flight on it.
    async fn release(&self) {}
}

pub type SharedAccessor = Arc<dyn AttributeAccessor>;

#[async_trait]
pub trait AttributeSource: Send + Sync {
    /// Resolve `attribute_name`. `Ok(None)` means the connector does not
    /// support it; errors are reserved for back-end failures.
    async fn connect_attribute(
        &self,
        attribute_name: &str,
        options: &Options,
    ) -> Result<Option<SharedAccessor>>;
}

/// What a connector declares about a notification category it agrees to raise.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationDeclaration {
    pub attachment_type: Option<CanonicalType>,
    pub severity: Severity,
    /// Native endpoint to listen at while the category is enabled
    pub endpoint: Option<String>,
}

impl NotificationDeclaration {
    pub fn new(severity: Severity) -> Self {
        Self {
            attachment_type: None,
            severity,
            endpoint: None,
        }
    }

    pub fn with_attachment(mut self, ty: CanonicalType) -> Self {
        self.attachment_type = Some(ty);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Called once when the resource attaches; the connector raises its
    /// notifications through this emitter.
    fn bind_emitter(&self, emitter: NotificationEmitter);

    /// `Ok(None)` means the category is not supported.
    async fn enable_notifications(
        &self,
        category: &str,
        options: &Options,
    ) -> Result<Option<NotificationDeclaration>>;

    async fn disable_notifications(&self, _category: &str) -> Result<()> {
        Ok(())
    }

    /// Native listener control for declared endpoints, if the connector has any.
    fn listener_control(&self) -> Option<Arc<dyn ListenerControl>> {
        None
    }
}

#[async_trait]
pub trait ListenerControl: Send + Sync {
    async fn start_listening(&self, endpoint: &str) -> Result<()>;
    async fn stop_listening(&self, endpoint: &str) -> Result<()>;
}

/// Capabilities of one attached resource.
#[derive(Clone, Default)]
pub struct Connector {
    pub attributes: Option<Arc<dyn AttributeSource>>,
    pub notifications: Option<Arc<dyn NotificationSource>>,
}

impl Connector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attributes(mut self, source: Arc<dyn AttributeSource>) -> Self {
        self.attributes = Some(source);
        self
    }

    pub fn with_notifications(mut self, source: Arc<dyn NotificationSource>) -> Self {
        self.notifications = Some(source);
        self
    }

    /// Both capabilities backed by one connector object.
    pub fn from_source<S>(source: Arc<S>) -> Self
    where
        S: AttributeSource + NotificationSource + 'static,
    {
        Self {
            attributes: Some(source.clone()),
            notifications: Some(source),
        }
    }
}
