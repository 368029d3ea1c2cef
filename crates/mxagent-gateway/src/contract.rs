//! Gateway contract
//!
//! The uniform surface every protocol front-end consumes:
//!
//! - attribute access: `get_attribute`, `set_attribute`
//! - notifications: `listen` -> stream of wire-rendered notifications
//! - enumeration: `list_attributes`, `list_notifications`
//!
//! A [`WireCodec`] decides what "wire value" means for a front-end.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use mxagent_core::bridge::{JsonBridge, TypeBridge};
use mxagent_core::notifications::{ChannelListener, NotificationFilter};
use mxagent_core::{
    Agent, AgentError, AttributeDescriptor, AttributeValue, CanonicalType, Notification,
    NotificationMetadata, NotificationRegistry, Result, SubscriptionHandle,
};
use serde_json::{json, Value as Json};
use tracing::{debug, warn};

/// Wire representation of values and notifications for one front-end.
pub trait WireCodec: Send + Sync + 'static {
    type Value: Send + 'static;
    type Event: Send + 'static;

    fn encode_value(&self, value: &AttributeValue) -> Result<Self::Value>;

    fn decode_value(&self, wire: &Self::Value, ty: &CanonicalType) -> Result<AttributeValue>;

    fn encode_notification(&self, notification: &Notification) -> Result<Self::Event>;
}

/// JSON values; notifications as JSON objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    bridge: JsonBridge,
}

impl WireCodec for JsonCodec {
    type Value = Json;
    type Event = Json;

    fn encode_value(&self, value: &AttributeValue) -> Result<Json> {
        Ok(self.bridge.to_wire(value)?)
    }

    fn decode_value(&self, wire: &Json, ty: &CanonicalType) -> Result<AttributeValue> {
        Ok(self.bridge.from_wire(wire, ty)?)
    }

    fn encode_notification(&self, notification: &Notification) -> Result<Json> {
        let attachment = match &notification.attachment {
            Some(attachment) => self.bridge.to_wire(attachment)?,
            None => Json::Null,
        };
        Ok(json!({
            "source": notification.source,
            "category": notification.category,
            "message": notification.message,
            "sequenceNumber": notification.sequence_number,
            "timestamp": notification.timestamp.to_rfc3339(),
            "severity": notification.severity.as_str(),
            "attachment": attachment,
        }))
    }
}

// ============================================================================
// Gateway
// ============================================================================

pub struct ResourceGateway<C: WireCodec> {
    agent: Arc<Agent>,
    codec: Arc<C>,
}

impl<C: WireCodec> Clone for ResourceGateway<C> {
    fn clone(&self) -> Self {
        Self {
            agent: self.agent.clone(),
            codec: self.codec.clone(),
        }
    }
}

impl<C: WireCodec> ResourceGateway<C> {
    pub fn new(agent: Arc<Agent>, codec: C) -> Self {
        Self {
            agent,
            codec: Arc::new(codec),
        }
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    fn descriptor(&self, resource: &str, name: &str) -> Result<AttributeDescriptor> {
        self.agent
            .attributes()
            .descriptor(resource, name)
            .ok_or_else(|| AgentError::not_found(format!("attribute '{}' of '{}'", name, resource)))
    }

    fn read_timeout(&self, descriptor: &AttributeDescriptor) -> Duration {
        descriptor
            .options
            .read_timeout()
            .unwrap_or_else(|| self.agent.read_timeout())
    }

    /// Read and encode. A read timeout yields the type's default value.
    pub async fn get_attribute(&self, resource: &str, name: &str) -> Result<C::Value> {
        let descriptor = self.descriptor(resource, name)?;
        let timeout = self.read_timeout(&descriptor);
        let value = match self
            .agent
            .attributes()
            .try_read(resource, name, timeout)
            .await
        {
            Ok(value) => value,
            Err(AgentError::Timeout(elapsed)) => {
                debug!(
                    resource = %resource,
                    attribute = %name,
                    timeout_ms = elapsed.as_millis() as u64,
                    "[Gateway] Read timed out, rendering default"
                );
                AttributeValue::default_for(&descriptor.canonical_type)
            }
            Err(e) => return Err(e),
        };
        self.codec.encode_value(&value)
    }

    /// Decode against the declared type and write.
    ///
    /// `Ok(false)` means the write timed out.
    pub async fn set_attribute(&self, resource: &str, name: &str, wire: &C::Value) -> Result<bool> {
        let descriptor = self.descriptor(resource, name)?;
        let value = self.codec.decode_value(wire, &descriptor.canonical_type)?;
        match self
            .agent
            .attributes()
            .try_write(resource, name, value, self.agent.write_timeout())
            .await
        {
            Ok(()) => Ok(true),
            Err(AgentError::Timeout(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Subscribe to every enabled notification of `resource`, optionally
    /// narrowed to one category and a filter expression.
    ///
    /// The stream ends once the subscriptions are released: by
    /// [`NotificationStream::unsubscribe`], by dropping the stream, or by the
    /// registry tearing the resource down.
    pub async fn listen(
        &self,
        resource: &str,
        category: Option<&str>,
        filter: Option<&str>,
    ) -> Result<NotificationStream<C::Event>> {
        let filter = filter
            .filter(|f| !f.trim().is_empty())
            .map(NotificationFilter::parse)
            .transpose()?;
        let registry = self.agent.notifications().clone();
        let (listener, mut receiver) = ChannelListener::new();
        let handles = registry
            .subscribe_resource(resource, category, listener, filter)
            .await?;

        let subscription = Arc::new(Subscription { registry, handles });
        let codec = self.codec.clone();
        let events = async_stream::stream! {
            while let Some(notification) = receiver.recv().await {
                match codec.encode_notification(&notification) {
                    Ok(event) => yield event,
                    Err(e) => warn!(
                        category = %notification.category,
                        error = %e,
                        "[Gateway] Notification could not be rendered"
                    ),
                }
            }
        };
        Ok(NotificationStream {
            inner: Box::pin(events),
            subscription,
        })
    }

    pub fn list_attributes(&self, resource: Option<&str>) -> Vec<AttributeDescriptor> {
        let registry = self.agent.attributes();
        match resource {
            Some(resource) => registry.descriptors(resource),
            None => registry
                .list_resources()
                .iter()
                .flat_map(|r| registry.descriptors(r))
                .collect(),
        }
    }

    pub fn list_notifications(&self, resource: Option<&str>) -> Vec<NotificationMetadata> {
        let registry = self.agent.notifications();
        match resource {
            Some(resource) => registry.metadata_for(resource),
            None => registry
                .list_resources()
                .iter()
                .flat_map(|r| registry.metadata_for(r))
                .collect(),
        }
    }
}

struct Subscription {
    registry: Arc<NotificationRegistry>,
    handles: Vec<SubscriptionHandle>,
}

impl Subscription {
    fn release(&self) -> usize {
        self.handles
            .iter()
            .filter(|h| self.registry.unsubscribe(h))
            .count()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Wire-rendered notifications for one `listen` call.
pub struct NotificationStream<E> {
    inner: Pin<Box<dyn Stream<Item = E> + Send>>,
    subscription: Arc<Subscription>,
}

impl<E> NotificationStream<E> {
    /// Release the subscriptions; buffered notifications are still yielded,
    /// then the stream ends. Returns how many were still active.
    pub fn unsubscribe(&self) -> usize {
        self.subscription.release()
    }

    pub fn handles(&self) -> &[SubscriptionHandle] {
        &self.subscription.handles
    }
}

impl<E> Stream for NotificationStream<E> {
    type Item = E;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<E>> {
        self.inner.as_mut().poll_next(cx)
    }
}
