use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Notification severity, ordered from least (`Unknown`) to most (`Panic`) severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Unknown,
    Debug,
    Informational,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Panic,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Debug => "debug",
            Severity::Informational => "informational",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Alert => "alert",
            Severity::Panic => "panic",
        }
    }

    /// Numeric level as JMX notifications carry it (0 = panic .. 7 = debug).
    pub fn level(&self) -> Option<u8> {
        match self {
            Severity::Panic => Some(0),
            Severity::Alert => Some(1),
            Severity::Critical => Some(2),
            Severity::Error => Some(3),
            Severity::Warning => Some(4),
            Severity::Notice => Some(5),
            Severity::Informational => Some(6),
            Severity::Debug => Some(7),
            Severity::Unknown => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Severity::Unknown),
            "debug" => Ok(Severity::Debug),
            "info" | "informational" => Ok(Severity::Informational),
            "notice" => Ok(Severity::Notice),
            "warn" | "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            "alert" => Ok(Severity::Alert),
            "panic" | "emergency" => Ok(Severity::Panic),
            other => Err(AgentError::InvalidValue(format!(
                "unknown severity '{}'",
                other
            ))),
        }
    }
}
