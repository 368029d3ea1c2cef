//! Attribute Registry
//!
//! Maps composite identifiers to live connector accessors.
//!
//! Locking:
//! - bind/unbind are serialized by one async `structure` mutex
//! - reads/writes clone the entry `Arc` out of the `DashMap` and never take
//!   the structure lock, so they only contend with each other per shard
//! - each entry has an `in_flight` gate: operations hold it shared, release
//!   of a replaced or unbound accessor waits for it exclusively

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::AttributeDescriptor;
use crate::connector::{AttributeSource, SharedAccessor};
use crate::error::{AgentError, Result};
use crate::event::AgentEvent;
use crate::event_bus::EventSender;
use crate::identifier::{CompositeId, IdScheme};
use crate::license::{Feature, LicensePolicy, SharedLicensePolicy, Unlimited};
use crate::options::Options;
use crate::types::{convert, AttributeValue};

struct Entry {
    descriptor: AttributeDescriptor,
    accessor: SharedAccessor,
    in_flight: tokio::sync::RwLock<()>,
}

impl Entry {
    /// Wait for in-flight operations, then free the accessor.
    async fn release(&self) {
        let _exclusive = self.in_flight.write().await;
        self.accessor.release().await;
    }
}

pub struct AttributeRegistry {
    scheme: IdScheme,
    sources: DashMap<String, Arc<dyn AttributeSource>>,
    entries: DashMap<String, Arc<Entry>>,
    structure: tokio::sync::Mutex<()>,
    license: SharedLicensePolicy,
    events: Option<EventSender>,
}

impl AttributeRegistry {
    pub fn new(scheme: IdScheme) -> Self {
        Self {
            scheme,
            sources: DashMap::new(),
            entries: DashMap::new(),
            structure: tokio::sync::Mutex::new(()),
            license: Arc::new(Unlimited),
            events: None,
        }
    }

    pub fn with_license(mut self, license: Arc<dyn LicensePolicy>) -> Self {
        self.license = license;
        self
    }

    pub fn with_event_sender(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn scheme(&self) -> &IdScheme {
        &self.scheme
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    fn entry(&self, key: &str) -> Option<Arc<Entry>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    // ========================================================================
    // Resources
    // ========================================================================

    pub fn register_resource(
        &self,
        resource: &str,
        source: Arc<dyn AttributeSource>,
    ) -> Result<()> {
        self.scheme.validate_resource(resource)?;
        self.sources.insert(resource.to_string(), source);
        debug!(resource = %resource, "[AttributeRegistry] Resource registered");
        Ok(())
    }

    /// Unbind every attribute of the resource and forget its source.
    pub async fn unregister_resource(&self, resource: &str) -> usize {
        let released = self.unbind_resource(resource).await;
        self.sources.remove(resource);
        released
    }

    pub fn has_resource(&self, resource: &str) -> bool {
        self.sources.contains_key(resource)
    }

    // ========================================================================
    // Bind / unbind
    // ========================================================================

    /// Bind `connector_name` of `resource` under the local `name`.
    ///
    /// `Ok(None)` means the connector does not support the attribute; an
    /// existing binding is then left untouched. Binding an identifier again
    /// swaps the accessor in place: readers see the old or the new one.
    pub async fn bind(
        &self,
        resource: &str,
        name: &str,
        connector_name: &str,
        options: Options,
    ) -> Result<Option<AttributeDescriptor>> {
        let id = self.scheme.compose(resource, name)?;
        let source = self
            .sources
            .get(resource)
            .map(|s| s.value().clone())
            .ok_or_else(|| AgentError::not_found(format!("resource '{}'", resource)))?;

        let _guard = self.structure.lock().await;

        let replacing = self.entries.contains_key(id.as_str());
        if !replacing {
            self.license.check(Feature::Attribute, self.entries.len())?;
        }

        let Some(accessor) = source.connect_attribute(connector_name, &options).await? else {
            debug!(
                resource = %resource,
                attribute = %connector_name,
                "[AttributeRegistry] Attribute not supported by connector"
            );
            return Ok(None);
        };

        let descriptor = AttributeDescriptor {
            resource: resource.to_string(),
            name: name.to_string(),
            connector_name: connector_name.to_string(),
            canonical_type: accessor.canonical_type().clone(),
            readable: accessor.is_readable(),
            writable: accessor.is_writable(),
            options,
        };
        let entry = Arc::new(Entry {
            descriptor: descriptor.clone(),
            accessor,
            in_flight: tokio::sync::RwLock::new(()),
        });

        if let Some(old) = self.entries.insert(id.as_str().to_string(), entry) {
            old.release().await;
        }

        info!(
            resource = %resource,
            attribute = %name,
            canonical_type = %descriptor.canonical_type,
            replaced = replacing,
            "[AttributeRegistry] Attribute bound"
        );
        self.emit(AgentEvent::AttributeBound {
            resource: resource.to_string(),
            attribute: name.to_string(),
            canonical_type: descriptor.canonical_type.to_string(),
            replaced: replacing,
        });
        Ok(Some(descriptor))
    }

    /// Unbind one attribute. Returns `false` if it was not bound.
    pub async fn unbind(&self, resource: &str, name: &str) -> Result<bool> {
        let id = self.scheme.compose(resource, name)?;
        let _guard = self.structure.lock().await;
        Ok(self.remove(&id).await)
    }

    /// Release every accessor of `resource`. Safe for resources with
    /// nothing bound.
    pub async fn unbind_resource(&self, resource: &str) -> usize {
        let _guard = self.structure.lock().await;
        let ids: Vec<CompositeId> = self
            .entries
            .iter()
            .filter_map(|e| self.scheme.parse(e.key()).ok())
            .filter(|id| id.resource() == resource)
            .collect();
        let mut released = 0;
        for id in &ids {
            if self.remove(id).await {
                released += 1;
            }
        }
        if released > 0 {
            info!(
                resource = %resource,
                released,
                "[AttributeRegistry] Resource attributes released"
            );
        }
        released
    }

    async fn remove(&self, id: &CompositeId) -> bool {
        let Some((_, entry)) = self.entries.remove(id.as_str()) else {
            return false;
        };
        entry.release().await;
        debug!(attribute = %id, "[AttributeRegistry] Attribute unbound");
        self.emit(AgentEvent::AttributeUnbound {
            resource: id.resource().to_string(),
            attribute: id.name().to_string(),
        });
        true
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Read with fallback: any failure, including timeout and an unknown
    /// identifier, yields `default`.
    pub async fn read(
        &self,
        resource: &str,
        name: &str,
        timeout: Duration,
        default: AttributeValue,
    ) -> AttributeValue {
        match self.try_read(resource, name, timeout).await {
            Ok(value) => value,
            Err(e) => {
                match &e {
                    AgentError::NotFound(_) | AgentError::Timeout(_) => debug!(
                        resource = %resource,
                        attribute = %name,
                        error = %e,
                        "[AttributeRegistry] Read fell back to default"
                    ),
                    _ => warn!(
                        resource = %resource,
                        attribute = %name,
                        error = %e,
                        "[AttributeRegistry] Read failed, using default"
                    ),
                }
                default
            }
        }
    }

    pub async fn try_read(
        &self,
        resource: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<AttributeValue> {
        let entry = self.lookup(resource, name)?;
        if !entry.descriptor.readable {
            return Err(AgentError::Unsupported(format!(
                "attribute '{}' of '{}' is write-only",
                name, resource
            )));
        }
        let read = async {
            let _shared = entry.in_flight.read().await;
            entry.accessor.read().await
        };
        let value = tokio::time::timeout(timeout, read)
            .await
            .map_err(|_| AgentError::Timeout(timeout))??;
        if value.canonical_type() == &entry.descriptor.canonical_type {
            Ok(value)
        } else {
            let converted = convert(value.value(), &entry.descriptor.canonical_type)?;
            Ok(AttributeValue::new(
                converted,
                entry.descriptor.canonical_type.clone(),
            )?)
        }
    }

    /// Write with fallback: `false` on timeout, unknown identifier,
    /// read-only attribute or any other failure.
    pub async fn write(
        &self,
        resource: &str,
        name: &str,
        value: AttributeValue,
        timeout: Duration,
    ) -> bool {
        match self.try_write(resource, name, value, timeout).await {
            Ok(()) => true,
            Err(e) => {
                debug!(
                    resource = %resource,
                    attribute = %name,
                    error = %e,
                    "[AttributeRegistry] Write rejected"
                );
                false
            }
        }
    }

    /// Write, converting `value` exactly to the declared type first.
    pub async fn try_write(
        &self,
        resource: &str,
        name: &str,
        value: AttributeValue,
        timeout: Duration,
    ) -> Result<()> {
        let entry = self.lookup(resource, name)?;
        if !entry.descriptor.writable {
            return Err(AgentError::Unsupported(format!(
                "attribute '{}' of '{}' is read-only",
                name, resource
            )));
        }
        let declared = &entry.descriptor.canonical_type;
        let value = if value.canonical_type() == declared {
            value
        } else {
            AttributeValue::new(convert(value.value(), declared)?, declared.clone())?
        };
        let write = async {
            let _shared = entry.in_flight.read().await;
            entry.accessor.write(value).await
        };
        tokio::time::timeout(timeout, write)
            .await
            .map_err(|_| AgentError::Timeout(timeout))?
    }

    fn lookup(&self, resource: &str, name: &str) -> Result<Arc<Entry>> {
        let id = self.scheme.compose(resource, name)?;
        self.entry(id.as_str())
            .ok_or_else(|| AgentError::not_found(format!("attribute '{}'", id)))
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    /// Resources with at least one bound attribute.
    pub fn list_resources(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|e| self.scheme.parse(e.key()).ok())
            .map(|id| id.resource().to_string())
            .collect()
    }

    pub fn list_attributes(&self, resource: &str) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|e| self.scheme.parse(e.key()).ok())
            .filter(|id| id.resource() == resource)
            .map(|id| id.name().to_string())
            .collect()
    }

    pub fn descriptor(&self, resource: &str, name: &str) -> Option<AttributeDescriptor> {
        self.lookup(resource, name)
            .ok()
            .map(|e| e.descriptor.clone())
    }

    pub fn descriptors(&self, resource: &str) -> Vec<AttributeDescriptor> {
        let mut all: Vec<AttributeDescriptor> = self
            .entries
            .iter()
            .filter(|e| e.value().descriptor.resource == resource)
            .map(|e| e.value().descriptor.clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
