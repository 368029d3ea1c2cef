use serde::Serialize;

use super::Severity;
use crate::options::Options;
use crate::types::CanonicalType;

/// An enabled notification as the registry exposes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationMetadata {
    pub resource: String,
    /// Local name under which the notification is enabled
    pub name: String,
    pub category: String,
    /// Connector-declared type of the attachment; `None` means no attachment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<CanonicalType>,
    pub severity: Severity,
    /// Connector endpoint that must be listened to while enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Options::is_empty")]
    pub options: Options,
}

impl NotificationMetadata {
    pub fn description(&self) -> Option<&str> {
        self.options.description()
    }
}
