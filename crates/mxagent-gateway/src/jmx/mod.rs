//! JMX-style gateway
//!
//! Renders attribute values through the OpenType bridge and notifications as
//! typed JMX events. Each resource is exposed as one MBean.

use chrono::{DateTime, Utc};
use mxagent_core::bridge::{open_type_of, OpenTypeBridge, OpenValue, TypeBridge};
use mxagent_core::options::OBJECT_NAME;
use mxagent_core::{AttributeValue, CanonicalType, Notification, Result, Severity};

use crate::contract::{ResourceGateway, WireCodec};

/// Domain of the object names published when a resource declares none.
pub const DEFAULT_DOMAIN: &str = "mxagent";

/// A notification as a JMX client receives it.
#[derive(Debug, Clone, PartialEq)]
pub struct JmxNotification {
    pub notification_type: String,
    /// Resource the notification was raised by
    pub source: String,
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub severity: Severity,
    pub user_data: Option<OpenValue>,
}

impl JmxNotification {
    /// Millisecond timestamp, as `javax.management.Notification` carries it.
    pub fn time_stamp(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JmxCodec {
    bridge: OpenTypeBridge,
}

impl WireCodec for JmxCodec {
    type Value = OpenValue;
    type Event = JmxNotification;

    fn encode_value(&self, value: &AttributeValue) -> Result<OpenValue> {
        Ok(self.bridge.to_wire(value)?)
    }

    fn decode_value(&self, wire: &OpenValue, ty: &CanonicalType) -> Result<AttributeValue> {
        Ok(self.bridge.from_wire(wire, ty)?)
    }

    fn encode_notification(&self, notification: &Notification) -> Result<JmxNotification> {
        let user_data = notification
            .attachment
            .as_ref()
            .map(|a| self.bridge.to_wire(a))
            .transpose()?;
        Ok(JmxNotification {
            notification_type: notification.category.clone(),
            source: notification.source.clone(),
            sequence_number: notification.sequence_number,
            timestamp: notification.timestamp,
            message: notification.message.clone(),
            severity: notification.severity,
            user_data,
        })
    }
}

pub type JmxGateway = ResourceGateway<JmxCodec>;

#[derive(Debug, Clone, PartialEq)]
pub struct MBeanAttributeInfo {
    pub name: String,
    /// Open type class name, e.g. `java.lang.Double`
    pub type_name: String,
    pub description: String,
    pub readable: bool,
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MBeanNotificationInfo {
    pub types: Vec<String>,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MBeanInfo {
    pub object_name: String,
    pub attributes: Vec<MBeanAttributeInfo>,
    pub notifications: Vec<MBeanNotificationInfo>,
}

impl ResourceGateway<JmxCodec> {
    pub fn object_name(&self, resource: &str) -> String {
        self.list_attributes(Some(resource))
            .iter()
            .find_map(|d| d.options.get(OBJECT_NAME).map(str::to_string))
            .unwrap_or_else(|| format!("{}:type=Resource,name={}", DEFAULT_DOMAIN, resource))
    }

    /// Describe `resource` as one MBean.
    pub fn mbean_info(&self, resource: &str) -> MBeanInfo {
        let attributes = self
            .list_attributes(Some(resource))
            .into_iter()
            .map(|d| MBeanAttributeInfo {
                type_name: open_type_of(&d.canonical_type).class_name(),
                description: d.description().unwrap_or(&d.name).to_string(),
                readable: d.readable,
                writable: d.writable,
                name: d.name,
            })
            .collect();
        let notifications = self
            .list_notifications(Some(resource))
            .into_iter()
            .map(|m| MBeanNotificationInfo {
                description: m.description().unwrap_or(&m.category).to_string(),
                types: vec![m.category],
                name: "javax.management.Notification".to_string(),
            })
            .collect();
        MBeanInfo {
            object_name: self.object_name(resource),
            attributes,
            notifications,
        }
    }
}
