//! mxagent: serves the configured resources over REST
//!
//! Configuration is read from the file named by `MXAGENT_CONFIG`; without
//! it the agent starts empty with default settings.

use std::sync::Arc;

use anyhow::Context;
use mxagent_core::{Agent, AgentBuilder, AgentConfig};
use mxagent_gateway::{init_logging, GatewayConfig, GatewayServer};
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::from_env()?;
    let _log_guard = init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "[mxagent] Starting"
    );

    let agent = Arc::new(AgentBuilder::from_config(&config)?.build());
    spawn_event_logger(&agent);

    for resource in &config.resources {
        agent
            .attach_memory(resource)
            .await
            .with_context(|| format!("Failed to attach resource '{}'", resource.name))?;
        info!(resource = %resource.name, "[mxagent] Resource attached");
    }

    let server = GatewayServer::new(GatewayConfig::from(config.gateway.clone()), agent.clone());
    info!(url = %server.config().base_url(), "[mxagent] REST gateway");

    let result = server.run_until(shutdown_signal()).await;
    agent.shutdown().await;
    if let Err(e) = &result {
        error!(error = %e, "[mxagent] Gateway stopped with an error");
    }
    result
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("[mxagent] Shutdown requested"),
        Err(e) => {
            warn!(error = %e, "[mxagent] Could not listen for ctrl-c");
            std::future::pending::<()>().await
        }
    }
}

/// Mirror domain events into the log at debug level.
fn spawn_event_logger(agent: &Agent) {
    let mut events = agent.event_bus().subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(
                event = event.type_name(),
                resource = ?event.resource(),
                "[mxagent] {:?}",
                event
            );
        }
    });
}
