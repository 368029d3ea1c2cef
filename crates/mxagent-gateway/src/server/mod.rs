//! Gateway Server
//!
//! HTTP server exposing the REST gateway.

mod request_id;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, Router};
use mxagent_core::config::GatewaySection;
use mxagent_core::Agent;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::contract::{JsonCodec, ResourceGateway};
use crate::rest::{self, AllowAll, RestState, SharedAccessGuard};

pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Enable CORS for browser access
    pub enable_cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewaySection::default().into()
    }
}

impl From<GatewaySection> for GatewayConfig {
    fn from(section: GatewaySection) -> Self {
        Self {
            host: section.host,
            port: section.port,
            enable_cors: section.enable_cors,
        }
    }
}

impl GatewayConfig {
    /// Get the socket address
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid gateway address {}:{}", self.host, self.port))
    }

    /// Base URL for this gateway
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

pub struct GatewayServer {
    config: GatewayConfig,
    agent: Arc<Agent>,
    guard: SharedAccessGuard,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, agent: Arc<Agent>) -> Self {
        Self {
            config,
            agent,
            guard: Arc::new(AllowAll),
        }
    }

    /// Replace the allow-all access guard.
    pub fn with_guard(mut self, guard: SharedAccessGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn build_router(&self) -> Router {
        let gateway = ResourceGateway::new(self.agent.clone(), JsonCodec::default());
        let state = RestState::new(gateway).with_guard(self.guard.clone());

        let mut router = rest::router(state)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(request_id_middleware));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router
    }

    /// Serve until the process is stopped.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` completes, then drain open connections.
    pub async fn run_until<S>(self, shutdown: S) -> anyhow::Result<()>
    where
        S: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.addr()?;
        info!("[Gateway] Starting on {}", addr);
        info!(
            "[Gateway] CORS: {}",
            if self.config.enable_cors {
                "enabled"
            } else {
                "disabled"
            }
        );

        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!(
            resources = self.agent.resources().len(),
            "[Gateway] Ready to accept connections"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("[Gateway] Stopped");
        Ok(())
    }

    /// Start the server in the background
    ///
    /// Returns a JoinHandle that can be used to wait for completion or abort.
    pub fn spawn(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
