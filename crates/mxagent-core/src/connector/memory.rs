//! In-memory connector
//!
//! A declarative resource whose attributes live in process memory. It has no
//! back end, so it is what the binary attaches from configuration and what
//! tests use when they need a well-behaved connector with tunable latency.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    AttributeAccessor, AttributeSource, NotificationDeclaration, NotificationSource,
    SharedAccessor,
};
use crate::bridge::{JsonBridge, TypeBridge};
use crate::error::{AgentError, Result};
use crate::notifications::{InvocationReport, Notification, NotificationEmitter, Severity};
use crate::options::Options;
use crate::types::{AttributeValue, CanonicalType, Value};

/// Category raised after a successful write.
pub const ATTRIBUTE_CHANGE: &str = "jmx.attribute.change";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryAttributeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub canonical_type: CanonicalType,
    /// JSON-bridged initial value; the type's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    pub writable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNotificationConfig {
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<CanonicalType>,
}

/// One declarative resource in the `resources` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResourceConfig {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<MemoryAttributeConfig>,
    #[serde(default)]
    pub notifications: Vec<MemoryNotificationConfig>,
    #[serde(default)]
    pub read_delay_ms: u64,
    #[serde(default)]
    pub write_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Connector
// ============================================================================

struct Slot {
    ty: CanonicalType,
    value: RwLock<Value>,
    writable: bool,
}

#[derive(Default)]
struct Shared {
    emitter: Mutex<Option<NotificationEmitter>>,
    enabled: Mutex<HashSet<String>>,
    released: AtomicUsize,
}

impl Shared {
    fn emitter_for(&self, category: &str) -> Option<NotificationEmitter> {
        if !self.enabled.lock().contains(category) {
            return None;
        }
        self.emitter.lock().clone()
    }
}

pub struct MemoryConnector {
    name: String,
    slots: DashMap<String, Arc<Slot>>,
    categories: DashMap<String, NotificationDeclaration>,
    shared: Arc<Shared>,
    read_delay: Duration,
    write_delay: Duration,
}

impl MemoryConnector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: DashMap::new(),
            categories: DashMap::new(),
            shared: Arc::new(Shared::default()),
            read_delay: Duration::ZERO,
            write_delay: Duration::ZERO,
        }
    }

    /// Build from a config entry, JSON-bridging every initial value.
    pub fn from_config(config: &MemoryResourceConfig) -> Result<Self> {
        let bridge = JsonBridge::new();
        let mut connector = Self::new(&config.name).with_delays(
            Duration::from_millis(config.read_delay_ms),
            Duration::from_millis(config.write_delay_ms),
        );
        for attribute in &config.attributes {
            let initial = match &attribute.initial {
                Some(json) => bridge.from_wire(json, &attribute.canonical_type)?,
                None => AttributeValue::default_for(&attribute.canonical_type),
            };
            connector = connector.with_attribute(&attribute.name, initial, attribute.writable);
        }
        for notification in &config.notifications {
            let mut declaration = NotificationDeclaration::new(notification.severity);
            if let Some(ty) = &notification.attachment {
                declaration = declaration.with_attachment(ty.clone());
            }
            connector = connector.with_notification(&notification.category, declaration);
        }
        Ok(connector)
    }

    pub fn with_attribute(self, name: &str, initial: AttributeValue, writable: bool) -> Self {
        let (value, ty) = initial.into_parts();
        self.slots.insert(
            name.to_string(),
            Arc::new(Slot {
                ty,
                value: RwLock::new(value),
                writable,
            }),
        );
        self
    }

    pub fn with_notification(self, category: &str, declaration: NotificationDeclaration) -> Self {
        self.categories.insert(category.to_string(), declaration);
        self
    }

    /// Artificial latency for every read and write.
    pub fn with_delays(mut self, read: Duration, write: Duration) -> Self {
        self.read_delay = read;
        self.write_delay = write;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Back-end side update, bypassing the writable flag.
    pub fn set(&self, attribute: &str, value: AttributeValue) -> Result<()> {
        let slot = self
            .slots
            .get(attribute)
            .map(|s| s.value().clone())
            .ok_or_else(|| AgentError::not_found(format!("attribute '{}'", attribute)))?;
        *slot.value.write() = coerce(value, &slot.ty)?;
        Ok(())
    }

    pub fn value(&self, attribute: &str) -> Option<AttributeValue> {
        let slot = self.slots.get(attribute)?;
        let value = slot.value.read().clone();
        AttributeValue::new(value, slot.ty.clone()).ok()
    }

    /// Raise a notification if `category` is enabled. Returns `None` when it
    /// is not or no registry is bound.
    pub async fn raise(&self, category: &str, message: &str) -> Option<InvocationReport> {
        self.raise_with(category, message, None).await
    }

    pub async fn raise_with(
        &self,
        category: &str,
        message: &str,
        attachment: Option<AttributeValue>,
    ) -> Option<InvocationReport> {
        let emitter = self.shared.emitter_for(category)?;
        let severity = self
            .categories
            .get(category)
            .map(|d| d.severity)
            .unwrap_or_default();
        let mut notification = Notification::new(category, message).with_severity(severity);
        if let Some(attachment) = attachment {
            notification = notification.with_attachment(attachment);
        }
        Some(emitter.emit(notification).await)
    }

    /// Number of accessors the registry has released.
    pub fn released_count(&self) -> usize {
        self.shared.released.load(Ordering::SeqCst)
    }

    pub fn enabled_categories(&self) -> HashSet<String> {
        self.shared.enabled.lock().clone()
    }
}

fn coerce(value: AttributeValue, ty: &CanonicalType) -> Result<Value> {
    if value.canonical_type() == ty {
        return Ok(value.into_value());
    }
    Ok(crate::types::convert(value.value(), ty)?)
}

#[async_trait]
impl AttributeSource for MemoryConnector {
    async fn connect_attribute(
        &self,
        attribute_name: &str,
        _options: &Options,
    ) -> Result<Option<SharedAccessor>> {
        let Some(slot) = self.slots.get(attribute_name).map(|s| s.value().clone()) else {
            return Ok(None);
        };
        Ok(Some(Arc::new(MemoryAccessor {
            name: attribute_name.to_string(),
            slot,
            shared: self.shared.clone(),
            read_delay: self.read_delay,
            write_delay: self.write_delay,
        })))
    }
}

#[async_trait]
impl NotificationSource for MemoryConnector {
    fn bind_emitter(&self, emitter: NotificationEmitter) {
        *self.shared.emitter.lock() = Some(emitter);
    }

    async fn enable_notifications(
        &self,
        category: &str,
        _options: &Options,
    ) -> Result<Option<NotificationDeclaration>> {
        let declaration = if category == ATTRIBUTE_CHANGE {
            NotificationDeclaration::new(Severity::Informational)
        } else {
            match self.categories.get(category) {
                Some(d) => d.value().clone(),
                None => return Ok(None),
            }
        };
        self.shared.enabled.lock().insert(category.to_string());
        debug!(resource = %self.name, category = %category, "[MemoryConnector] Category enabled");
        Ok(Some(declaration))
    }

    async fn disable_notifications(&self, category: &str) -> Result<()> {
        self.shared.enabled.lock().remove(category);
        Ok(())
    }
}

struct MemoryAccessor {
    name: String,
    slot: Arc<Slot>,
    shared: Arc<Shared>,
    read_delay: Duration,
    write_delay: Duration,
}

#[async_trait]
impl AttributeAccessor for MemoryAccessor {
    fn canonical_type(&self) -> &CanonicalType {
        &self.slot.ty
    }

    fn is_writable(&self) -> bool {
        self.slot.writable
    }

    async fn read(&self) -> Result<AttributeValue> {
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        let value = self.slot.value.read().clone();
        Ok(AttributeValue::new(value, self.slot.ty.clone())?)
    }

    async fn write(&self, value: AttributeValue) -> Result<()> {
        if !self.write_delay.is_zero() {
            tokio::time::sleep(self.write_delay).await;
        }
        let value = coerce(value, &self.slot.ty)?;
        *self.slot.value.write() = value;

        if let Some(emitter) = self.shared.emitter_for(ATTRIBUTE_CHANGE) {
            let notification =
                Notification::new(ATTRIBUTE_CHANGE, format!("{} changed", self.name))
                    .with_severity(Severity::Informational);
            // Listeners run outside the caller's write timeout
            let _delivery = emitter.emit_detached(notification);
        }
        Ok(())
    }

    async fn release(&self) {
        self.shared.released.fetch_add(1, Ordering::SeqCst);
    }
}
