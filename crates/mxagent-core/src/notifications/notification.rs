use std::fmt;

use chrono::{DateTime, Utc};

use super::Severity;
use crate::types::AttributeValue;

/// A canonical notification raised by a connector.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Resource that raised the notification
    pub source: String,
    pub category: String,
    pub message: String,
    /// Zero until the registry stamps it
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub attachment: Option<AttributeValue>,
}

impl Notification {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: String::new(),
            category: category.into(),
            message: message.into(),
            sequence_number: 0,
            timestamp: Utc::now(),
            severity: Severity::Unknown,
            attachment: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_attachment(mut self, attachment: AttributeValue) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}] {}/{}: {}",
            self.sequence_number, self.severity, self.source, self.category, self.message
        )
    }
}
