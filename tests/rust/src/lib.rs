//! Shared test utilities and fixtures for mxagent integration tests.

pub use mxagent_core::{Agent, AgentEvent, AttributeValue, CanonicalType};

/// Mock connectors and listeners
pub mod mocks;
pub use mocks::{FailingListener, FakeServer, RecordingListener, RemoteConnector};

/// Event testing utilities
pub mod events {
    use mxagent_core::{AgentEvent, EventReceiver};
    use std::time::Duration;

    /// Collect events from a receiver until it stays quiet for `timeout`.
    pub async fn collect_events(
        receiver: &mut EventReceiver,
        timeout: Duration,
    ) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(timeout, receiver.recv()).await {
            events.push(event);
        }
        events
    }

    /// Wait for the first event matching `predicate`.
    pub async fn wait_for_event<F>(
        receiver: &mut EventReceiver,
        timeout: Duration,
        predicate: F,
    ) -> Option<AgentEvent>
    where
        F: Fn(&AgentEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, receiver.recv()).await {
                Ok(Some(event)) if predicate(&event) => return Some(event),
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => return None,
            }
        }
    }
}

/// Test fixture utilities
pub mod fixtures {
    use mxagent_core::connector::memory::MemoryResourceConfig;
    use mxagent_core::Agent;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    /// `host1`: `cpuLoad` (float64), `uptime` (read-only int64), `hostname`
    /// (string) and a `cpu.high` notification.
    pub fn host1() -> MemoryResourceConfig {
        serde_json::from_value(json!({
            "name": "host1",
            "attributes": [
                { "name": "cpuLoad", "type": { "kind": "float64" }, "initial": 0.0 },
                { "name": "uptime", "type": { "kind": "int64" }, "initial": 3600, "writable": false },
                { "name": "hostname", "type": { "kind": "string" }, "initial": "web-01" }
            ],
            "notifications": [
                { "category": "cpu.high", "severity": "warning" }
            ]
        }))
        .expect("host1 fixture")
    }

    /// A resource whose reads take longer than [`SHORT_TIMEOUT`].
    pub fn slow() -> MemoryResourceConfig {
        serde_json::from_value(json!({
            "name": "slow",
            "read_delay_ms": 500,
            "write_delay_ms": 500,
            "attributes": [ { "name": "queueDepth", "type": { "kind": "int32" }, "initial": 12 } ]
        }))
        .expect("slow fixture")
    }

    pub const SHORT_TIMEOUT: Duration = Duration::from_millis(50);

    /// An agent with `host1` and `slow` attached and short timeouts.
    pub async fn agent() -> Arc<Agent> {
        let agent = Arc::new(
            Agent::builder()
                .with_timeouts(SHORT_TIMEOUT, SHORT_TIMEOUT)
                .build(),
        );
        agent.attach_memory(&host1()).await.expect("attach host1");
        agent.attach_memory(&slow()).await.expect("attach slow");
        agent
    }
}

/// Async test helpers
pub mod async_helpers {
    use std::time::Duration;
    use tokio::time::timeout;

    /// Run an async operation with a timeout
    pub async fn with_timeout<F, T>(duration: Duration, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        timeout(duration, f).await.expect("Operation timed out")
    }

    /// Poll `condition` until it holds or `duration` elapses.
    pub async fn eventually<F>(duration: Duration, condition: F) -> bool
    where
        F: Fn() -> bool,
    {
        let deadline = tokio::time::Instant::now() + duration;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    /// Default test timeout (5 seconds)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
}
