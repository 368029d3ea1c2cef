//! License gate consulted by the registries when a feature is bound.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Attribute,
    Notification,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Attribute => write!(f, "attribute"),
            Feature::Notification => write!(f, "notification"),
        }
    }
}

/// Injected policy deciding whether one more feature may be bound.
///
/// `already_bound` is the number of features of that kind the registry holds
/// before the new one. Rebinding an existing identifier is not consulted.
pub trait LicensePolicy: Send + Sync {
    fn check(&self, feature: Feature, already_bound: usize) -> Result<()>;
}

pub type SharedLicensePolicy = Arc<dyn LicensePolicy>;

#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl LicensePolicy for Unlimited {
    fn check(&self, _feature: Feature, _already_bound: usize) -> Result<()> {
        Ok(())
    }
}

/// Caps the number of bound features per kind; `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxFeatures {
    #[serde(default)]
    pub attributes: Option<usize>,
    #[serde(default)]
    pub notifications: Option<usize>,
}

impl MaxFeatures {
    pub fn attributes(limit: usize) -> Self {
        Self {
            attributes: Some(limit),
            notifications: None,
        }
    }

    pub fn notifications(limit: usize) -> Self {
        Self {
            attributes: None,
            notifications: Some(limit),
        }
    }
}

impl LicensePolicy for MaxFeatures {
    fn check(&self, feature: Feature, already_bound: usize) -> Result<()> {
        let limit = match feature {
            Feature::Attribute => self.attributes,
            Feature::Notification => self.notifications,
        };
        match limit {
            Some(limit) if already_bound >= limit => Err(AgentError::LicenseDenied(format!(
                "at most {} {} bindings allowed",
                limit, feature
            ))),
            _ => Ok(()),
        }
    }
}
