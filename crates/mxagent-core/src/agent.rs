//! Agent - composition root for one adapter instance
//!
//! Owns both registries and the event bus, and attaches/detaches resources:
//!
//! ```text
//!   attach(resource, Connector)
//!         │
//!         ├─ AttributeSource    ──► AttributeRegistry
//!         └─ NotificationSource ──► NotificationRegistry (emitter bound)
//!         │
//!         ▼
//!   ResourceAttached ──► EventBus
//! ```
//!
//! Connectors backed by a remote connection get their `ConnectionManager`
//! from [`Agent::connection_manager`] so the configured retry policy, health
//! check and event wiring apply to them.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, warn};

use crate::attributes::AttributeRegistry;
use crate::config::AgentConfig;
use crate::connection::{ConnectionFactory, ConnectionManager, ConnectionSettings};
use crate::connector::memory::{MemoryConnector, MemoryResourceConfig};
use crate::connector::Connector;
use crate::error::Result;
use crate::event::AgentEvent;
use crate::event_bus::{EventBus, SharedEventBus};
use crate::identifier::IdScheme;
use crate::license::{LicensePolicy, SharedLicensePolicy, Unlimited};
use crate::notifications::{ListenerInvoker, NotificationRegistry};
use crate::options::Options;

pub struct AgentBuilder {
    scheme: IdScheme,
    invoker: ListenerInvoker,
    detached_delivery: bool,
    license: SharedLicensePolicy,
    event_bus: Option<SharedEventBus>,
    read_timeout: Duration,
    write_timeout: Duration,
    connection: ConnectionSettings,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            scheme: IdScheme::default(),
            invoker: ListenerInvoker::default(),
            detached_delivery: false,
            license: Arc::new(Unlimited),
            event_bus: None,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            connection: ConnectionSettings::default(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> anyhow::Result<Self> {
        Ok(Self::new()
            .with_scheme(config.registry.scheme()?)
            .with_invoker(config.notifications.invoker())
            .with_detached_delivery(config.notifications.detached_delivery)
            .with_timeouts(config.registry.read_timeout(), config.registry.write_timeout())
            .with_connection_settings(config.connection.settings()))
    }

    pub fn with_scheme(mut self, scheme: IdScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_invoker(mut self, invoker: ListenerInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    pub fn with_detached_delivery(mut self, detached: bool) -> Self {
        self.detached_delivery = detached;
        self
    }

    pub fn with_license(mut self, license: Arc<dyn LicensePolicy>) -> Self {
        self.license = license;
        self
    }

    pub fn with_event_bus(mut self, bus: SharedEventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn with_connection_settings(mut self, settings: ConnectionSettings) -> Self {
        self.connection = settings;
        self
    }

    pub fn build(self) -> Agent {
        let event_bus = self
            .event_bus
            .unwrap_or_else(|| Arc::new(EventBus::new()));
        let sender = event_bus.sender();

        let attributes = AttributeRegistry::new(self.scheme.clone())
            .with_license(self.license.clone())
            .with_event_sender(sender.clone());
        let notifications = NotificationRegistry::new(self.scheme)
            .with_invoker(self.invoker.with_event_sender(sender.clone()))
            .with_detached_delivery(self.detached_delivery)
            .with_license(self.license)
            .with_event_sender(sender);

        Agent {
            attributes: Arc::new(attributes),
            notifications: Arc::new(notifications),
            event_bus,
            resources: DashMap::new(),
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            connection: self.connection,
        }
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Agent {
    attributes: Arc<AttributeRegistry>,
    notifications: Arc<NotificationRegistry>,
    event_bus: SharedEventBus,
    resources: DashMap<String, Connector>,
    read_timeout: Duration,
    write_timeout: Duration,
    connection: ConnectionSettings,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    pub fn attributes(&self) -> &Arc<AttributeRegistry> {
        &self.attributes
    }

    pub fn notifications(&self) -> &Arc<NotificationRegistry> {
        &self.notifications
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.event_bus
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn connection_settings(&self) -> &ConnectionSettings {
        &self.connection
    }

    /// A connection manager for `factory` with the configured retry policy,
    /// wired to the event bus, its health check running when an interval is
    /// configured. Must be called within a tokio runtime.
    pub fn connection_manager<F: ConnectionFactory>(
        &self,
        factory: F,
    ) -> Arc<ConnectionManager<F>> {
        let manager = Arc::new(
            self.connection
                .manager(factory)
                .with_event_sender(self.event_bus.sender()),
        );
        if let Some(interval) = self.connection.health_check_interval {
            manager.start_health_check(interval);
        }
        info!(
            endpoint = %manager.endpoint(),
            max_attempts = manager.policy().max_attempts,
            health_check = self.connection.health_check_interval.is_some(),
            "[Agent] Connection manager created"
        );
        manager
    }

    pub fn resources(&self) -> BTreeSet<String> {
        self.resources.iter().map(|r| r.key().clone()).collect()
    }

    pub fn is_attached(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }

    /// Attach a resource with whatever capabilities its connector offers.
    ///
    /// Attaching a name that is already attached detaches the old resource
    /// first.
    pub async fn attach(&self, resource: &str, connector: Connector) -> Result<()> {
        self.attributes.scheme().validate_resource(resource)?;
        if self.is_attached(resource) {
            warn!(resource = %resource, "[Agent] Resource re-attached, detaching previous");
            self.detach(resource).await;
        }

        if let Some(source) = &connector.attributes {
            self.attributes.register_resource(resource, source.clone())?;
        }
        if let Some(source) = &connector.notifications {
            self.notifications
                .register_resource(resource, source.clone())?;
        }
        self.resources.insert(resource.to_string(), connector);

        info!(resource = %resource, "[Agent] Resource attached");
        self.event_bus.sender().emit(AgentEvent::ResourceAttached {
            resource: resource.to_string(),
        });
        Ok(())
    }

    /// Release every attribute and notification of `resource`.
    ///
    /// Returns `false` if it was not attached.
    pub async fn detach(&self, resource: &str) -> bool {
        if self.resources.remove(resource).is_none() {
            return false;
        }
        let attributes = self.attributes.unregister_resource(resource).await;
        let notifications = self.notifications.unregister_resource(resource).await;

        info!(
            resource = %resource,
            attributes,
            notifications,
            "[Agent] Resource detached"
        );
        self.event_bus.sender().emit(AgentEvent::ResourceDetached {
            resource: resource.to_string(),
            attributes,
            notifications,
        });
        true
    }

    /// Attach a declarative in-memory resource, binding every attribute and
    /// enabling every notification category under its own name.
    pub async fn attach_memory(
        &self,
        config: &MemoryResourceConfig,
    ) -> Result<Arc<MemoryConnector>> {
        let connector = Arc::new(MemoryConnector::from_config(config)?);
        self.attach(&config.name, Connector::from_source(connector.clone()))
            .await?;

        for attribute in &config.attributes {
            self.attributes
                .bind(&config.name, &attribute.name, &attribute.name, Options::new())
                .await?;
        }
        for notification in &config.notifications {
            self.notifications
                .enable(
                    &config.name,
                    &notification.category,
                    &notification.category,
                    Options::new(),
                )
                .await?;
        }
        Ok(connector)
    }

    /// Detach every resource.
    pub async fn shutdown(&self) {
        let dropped = self.notifications.unsubscribe_all();
        for resource in self.resources() {
            self.detach(&resource).await;
        }
        info!(subscriptions = dropped, "[Agent] Shut down");
    }
}
