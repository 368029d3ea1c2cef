use std::time::Duration;

use super::{ConnectionFactory, ConnectionManager, RetryPolicy};

/// Deployment-wide settings applied to every connection-backed connector.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub retry: RetryPolicy,
    /// Budget a connector gives one remote operation, reconnect included
    pub operation_timeout: Duration,
    /// Health check disabled when `None`
    pub health_check_interval: Option<Duration>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            operation_timeout: Duration::from_secs(5),
            health_check_interval: None,
        }
    }
}

impl ConnectionSettings {
    /// A manager for `factory` using these settings' retry policy.
    ///
    /// The health check is not started here; it needs the manager behind an
    /// `Arc`, see `Agent::connection_manager`.
    pub fn manager<F: ConnectionFactory>(&self, factory: F) -> ConnectionManager<F> {
        ConnectionManager::new(factory, self.retry.clone())
    }
}
