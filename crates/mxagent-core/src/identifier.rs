//! Composite identifiers
//!
//! Registries key every attribute and notification on one string derived from
//! `(resource, local name)`. The resource part may never contain the
//! separator, so splitting at the first separator always recovers the pair.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Separator convention used to compose identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdScheme {
    separator: String,
}

impl IdScheme {
    /// The `resource::name` scheme used by the JMX and command gateways.
    pub fn double_colon() -> Self {
        Self {
            separator: "::".to_string(),
        }
    }

    /// The `resource/name` scheme used by the REST gateway.
    pub fn slash() -> Self {
        Self {
            separator: "/".to_string(),
        }
    }

    pub fn new(separator: impl Into<String>) -> Result<Self> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(AgentError::InvalidIdentifier(
                "separator must not be empty".to_string(),
            ));
        }
        Ok(Self { separator })
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Reject resource names this scheme cannot represent.
    pub fn validate_resource(&self, resource: &str) -> Result<()> {
        if resource.is_empty() {
            return Err(AgentError::InvalidIdentifier(
                "resource name must not be empty".to_string(),
            ));
        }
        // The first separator in `resource + separator` must be the appended
        // one, which also rules out names ending in a partial separator.
        let candidate = format!("{}{}", resource, self.separator);
        if candidate.find(self.separator.as_str()) != Some(resource.len()) {
            return Err(AgentError::InvalidIdentifier(format!(
                "resource name '{}' overlaps the separator '{}'",
                resource, self.separator
            )));
        }
        Ok(())
    }

    pub fn compose(&self, resource: &str, name: &str) -> Result<CompositeId> {
        self.validate_resource(resource)?;
        if name.is_empty() {
            return Err(AgentError::InvalidIdentifier(format!(
                "empty local name under resource '{}'",
                resource
            )));
        }
        Ok(CompositeId {
            key: format!("{}{}{}", resource, self.separator, name),
            split: resource.len(),
            separator_len: self.separator.len(),
        })
    }

    /// Parse a key produced by [`compose`](Self::compose).
    pub fn parse(&self, key: &str) -> Result<CompositeId> {
        match key.find(self.separator.as_str()) {
            Some(split) if split > 0 && split + self.separator.len() < key.len() => {
                Ok(CompositeId {
                    key: key.to_string(),
                    split,
                    separator_len: self.separator.len(),
                })
            }
            _ => Err(AgentError::InvalidIdentifier(format!(
                "'{}' is not a composite identifier",
                key
            ))),
        }
    }
}

impl Default for IdScheme {
    fn default() -> Self {
        Self::double_colon()
    }
}

/// A `(resource, name)` pair together with its registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeId {
    key: String,
    split: usize,
    separator_len: usize,
}

impl CompositeId {
    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn resource(&self) -> &str {
        &self.key[..self.split]
    }

    pub fn name(&self) -> &str {
        &self.key[self.split + self.separator_len..]
    }

    pub fn into_key(self) -> String {
        self.key
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
