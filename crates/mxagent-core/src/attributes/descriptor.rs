use serde::Serialize;

use crate::options::Options;
use crate::types::CanonicalType;

/// A bound attribute as the registry exposes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDescriptor {
    pub resource: String,
    /// Local name under which the attribute is exposed
    pub name: String,
    /// Name the connector resolved
    pub connector_name: String,
    #[serde(rename = "type")]
    pub canonical_type: CanonicalType,
    pub readable: bool,
    pub writable: bool,
    #[serde(skip_serializing_if = "Options::is_empty")]
    pub options: Options,
}

impl AttributeDescriptor {
    pub fn description(&self) -> Option<&str> {
        self.options.description()
    }

    pub fn units(&self) -> Option<&str> {
        self.options.units()
    }

    /// `r`, `w` or `rw`, as directory listings show it.
    pub fn access(&self) -> &'static str {
        match (self.readable, self.writable) {
            (true, true) => "rw",
            (true, false) => "r",
            (false, true) => "w",
            (false, false) => "-",
        }
    }
}
