//! Agent configuration
//!
//! One JSON document, every section optional:
//!
//! ```json
//! {
//!   "registry":      { "separator": "::", "read_timeout_ms": 2000 },
//!   "notifications": { "invocation": "parallel", "max_concurrency": 32 },
//!   "connection":    { "max_attempts": 5, "health_check_interval_ms": 10000 },
//!   "gateway":       { "host": "0.0.0.0", "port": 8735 },
//!   "logging":       { "level": "debug", "directory": "/var/log/mxagent" },
//!   "resources":     [ { "name": "host1", "attributes": [ ... ] } ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::connection::{ConnectionSettings, RetryPolicy};
use crate::connector::memory::MemoryResourceConfig;
use crate::identifier::IdScheme;
use crate::notifications::{InvocationMode, ListenerInvoker};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "MXAGENT_CONFIG";

pub const DEFAULT_GATEWAY_PORT: u16 = 8735;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub registry: RegistryConfig,
    pub notifications: NotificationConfig,
    pub connection: ConnectionConfig,
    pub gateway: GatewaySection,
    pub logging: LoggingConfig,
    pub resources: Vec<MemoryResourceConfig>,
}

impl AgentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AgentConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        info!(
            path = %path.display(),
            resources = config.resources.len(),
            "[Config] Loaded"
        );
        Ok(config)
    }

    /// Load from `MXAGENT_CONFIG` when set, defaults otherwise.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.registry.scheme()?;
        for resource in &self.resources {
            self.registry
                .scheme()?
                .validate_resource(&resource.name)
                .with_context(|| format!("Invalid resource '{}'", resource.name))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub separator: String,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            separator: IdScheme::default().separator().to_string(),
            read_timeout_ms: 2_000,
            write_timeout_ms: 2_000,
        }
    }
}

impl RegistryConfig {
    pub fn scheme(&self) -> Result<IdScheme> {
        IdScheme::new(self.separator.as_str()).context("Invalid identifier separator")
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub invocation: InvocationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Deliver on a spawned task rather than the connector's
    pub detached_delivery: bool,
}

impl NotificationConfig {
    pub fn invoker(&self) -> ListenerInvoker {
        let invoker = ListenerInvoker::new(self.invocation);
        match self.max_concurrency {
            Some(permits) if self.invocation == InvocationMode::Parallel => {
                invoker.with_max_concurrency(permits)
            }
            _ => invoker,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub operation_timeout_ms: u64,
    /// Health check disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_interval_ms: Option<u64>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.multiplier,
            operation_timeout_ms: 5_000,
            health_check_interval_ms: None,
        }
    }
}

impl ConnectionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            multiplier: self.backoff_multiplier,
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Option<Duration> {
        self.health_check_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            retry: self.retry_policy(),
            operation_timeout: self.operation_timeout(),
            health_check_interval: self.health_check_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_GATEWAY_PORT,
            enable_cors: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
    /// Daily-rolling file output; the platform data dir when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "mxagent".to_string(),
        }
    }
}
