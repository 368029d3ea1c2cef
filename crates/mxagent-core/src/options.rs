//! Free-form options bag shared by attribute and notification metadata.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DESCRIPTION: &str = "description";
pub const UNITS: &str = "units";
/// Per-attribute read timeout in milliseconds
pub const READ_TIMEOUT: &str = "readTimeout";
/// Sub-resource (for example a JMX object name) that owns the feature
pub const OBJECT_NAME: &str = "objectName";
pub const SEVERITY: &str = "severity";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, String>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn description(&self) -> Option<&str> {
        self.get(DESCRIPTION)
    }

    pub fn units(&self) -> Option<&str> {
        self.get(UNITS)
    }

    pub fn object_name(&self) -> Option<&str> {
        self.get(OBJECT_NAME)
    }

    /// `readTimeout` in milliseconds; unparsable values are ignored.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.get(READ_TIMEOUT)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
