//! Mock connectors and listeners for integration tests
//!
//! - `RecordingListener` / `SlowListener` / `FailingListener`: observe, delay
//!   and break deliveries
//! - `GatedSource`: accessors whose reads block until released, for
//!   concurrency tests around rebinding
//! - `FlakySource`: accessors that fail a configured number of reads
//! - `FakeServer` + `RemoteConnector`: a remote back-end reached through a
//!   `ConnectionManager`, with native listener registrations that are lost
//!   when the connection drops

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use mxagent_core::notifications::NotificationEmitter;
use mxagent_core::{
    Agent, AgentError, AttributeAccessor, AttributeSource, AttributeValue, CanonicalType,
    ConnectionFactory, ConnectionManager, InvocationReport, ListenerBinding, ListenerControl,
    Notification, NotificationDeclaration, NotificationListener, NotificationSource, Options,
    Result, Severity, SharedAccessor,
};

// ============================================================================
// Listeners
// ============================================================================

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingListener {
    received: Mutex<Vec<Notification>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.received.lock().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .map(|n| n.message.clone())
            .collect()
    }

    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl NotificationListener for RecordingListener {
    async fn handle(&self, notification: &Notification) -> anyhow::Result<()> {
        self.received.lock().push(notification.clone());
        Ok(())
    }
}

/// Records notifications after sleeping for `delay` on each delivery.
pub struct SlowListener {
    delay: Duration,
    inner: RecordingListener,
}

impl SlowListener {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            inner: RecordingListener::default(),
        })
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }
}

#[async_trait]
impl NotificationListener for SlowListener {
    async fn handle(&self, notification: &Notification) -> anyhow::Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.handle(notification).await
    }
}

/// Fails (or panics) on every delivery.
pub struct FailingListener {
    panic: bool,
    calls: AtomicUsize,
}

impl FailingListener {
    pub fn erroring() -> Arc<Self> {
        Arc::new(Self {
            panic: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            panic: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationListener for FailingListener {
    async fn handle(&self, notification: &Notification) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("listener panicked on {}", notification.category);
        }
        anyhow::bail!("listener failed on {}", notification.category)
    }
}

// ============================================================================
// GatedSource
// ============================================================================

/// Every attribute is an `int64` equal to the generation of the accessor
/// that served it. Reads block until `open` hands out permits.
pub struct GatedSource {
    gate: Arc<Semaphore>,
    generation: AtomicUsize,
    released: Arc<AtomicUsize>,
    connects: AtomicUsize,
}

impl GatedSource {
    /// `open` is false: reads wait for [`GatedSource::open`].
    pub fn new(open: bool) -> Arc<Self> {
        let permits = if open { Semaphore::MAX_PERMITS } else { 0 };
        Arc::new(Self {
            gate: Arc::new(Semaphore::new(permits)),
            generation: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn open(&self, reads: usize) {
        self.gate.add_permits(reads);
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

struct GatedAccessor {
    ty: CanonicalType,
    generation: i64,
    gate: Arc<Semaphore>,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl AttributeAccessor for GatedAccessor {
    fn canonical_type(&self) -> &CanonicalType {
        &self.ty
    }

    fn is_writable(&self) -> bool {
        false
    }

    async fn read(&self) -> Result<AttributeValue> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(AgentError::connector)?;
        permit.forget();
        Ok(AttributeValue::scalar(self.generation)?)
    }

    async fn write(&self, _value: AttributeValue) -> Result<()> {
        Err(AgentError::Unsupported("read-only".to_string()))
    }

    async fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AttributeSource for GatedSource {
    async fn connect_attribute(
        &self,
        _attribute_name: &str,
        _options: &Options,
    ) -> Result<Option<SharedAccessor>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) as i64 + 1;
        Ok(Some(Arc::new(GatedAccessor {
            ty: CanonicalType::Int64,
            generation,
            gate: self.gate.clone(),
            released: self.released.clone(),
        })))
    }
}

// ============================================================================
// FlakySource
// ============================================================================

/// `float64` attributes whose first `failures` reads fail with a connector error.
pub struct FlakySource {
    failures: Arc<AtomicUsize>,
    value: f64,
}

impl FlakySource {
    pub fn new(failures: usize, value: f64) -> Arc<Self> {
        Arc::new(Self {
            failures: Arc::new(AtomicUsize::new(failures)),
            value,
        })
    }
}

struct FlakyAccessor {
    ty: CanonicalType,
    failures: Arc<AtomicUsize>,
    value: f64,
}

#[async_trait]
impl AttributeAccessor for FlakyAccessor {
    fn canonical_type(&self) -> &CanonicalType {
        &self.ty
    }

    fn is_writable(&self) -> bool {
        false
    }

    async fn read(&self) -> Result<AttributeValue> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AgentError::connector("back-end hiccup"));
        }
        Ok(AttributeValue::scalar(self.value)?)
    }

    async fn write(&self, _value: AttributeValue) -> Result<()> {
        Err(AgentError::Unsupported("read-only".to_string()))
    }
}

#[async_trait]
impl AttributeSource for FlakySource {
    async fn connect_attribute(
        &self,
        attribute_name: &str,
        _options: &Options,
    ) -> Result<Option<SharedAccessor>> {
        if attribute_name.starts_with("unsupported") {
            return Ok(None);
        }
        Ok(Some(Arc::new(FlakyAccessor {
            ty: CanonicalType::Float64,
            failures: self.failures.clone(),
            value: self.value,
        })))
    }
}

// ============================================================================
// FakeServer / RemoteConnector
// ============================================================================

/// Remote back-end. Connections are numbered from 1; everything below
/// `dead_below` is dead. Listener registrations live per connection.
#[derive(Default)]
pub struct FakeServer {
    next_connection: AtomicUsize,
    dead_below: AtomicUsize,
    refuse: AtomicUsize,
    listeners: Mutex<HashMap<usize, Vec<String>>>,
    values: Mutex<HashMap<String, f64>>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_value(self: Arc<Self>, name: &str, value: f64) -> Arc<Self> {
        self.values.lock().insert(name.to_string(), value);
        self
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Connections opened so far.
    pub fn connects(&self) -> usize {
        self.next_connection.load(Ordering::SeqCst)
    }

    /// Kill every open connection; registrations on them are lost.
    pub fn kill_connections(&self) {
        let newest = self.next_connection.load(Ordering::SeqCst);
        self.dead_below.store(newest + 1, Ordering::SeqCst);
        self.listeners.lock().clear();
    }

    fn is_alive(&self, connection: usize) -> bool {
        connection >= self.dead_below.load(Ordering::SeqCst)
    }

    /// Whether some live connection carries a registration for `target`.
    pub fn is_listening(&self, target: &str) -> bool {
        self.listeners
            .lock()
            .iter()
            .any(|(connection, targets)| {
                self.is_alive(*connection) && targets.iter().any(|t| t == target)
            })
    }

    pub fn registrations(&self, target: &str) -> usize {
        self.listeners
            .lock()
            .values()
            .flatten()
            .filter(|t| t.as_str() == target)
            .count()
    }

    fn read(&self, connection: usize, name: &str) -> Result<f64> {
        if !self.is_alive(connection) {
            return Err(AgentError::ConnectionLost(format!(
                "connection {} reset",
                connection
            )));
        }
        self.values
            .lock()
            .get(name)
            .copied()
            .ok_or_else(|| AgentError::not_found(name.to_string()))
    }
}

pub struct FakeFactory {
    server: Arc<FakeServer>,
}

impl FakeFactory {
    pub fn new(server: Arc<FakeServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    type Connection = usize;

    fn endpoint(&self) -> &str {
        "fake://remote"
    }

    async fn connect(&self) -> Result<usize> {
        let refuse = self.server.refuse.load(Ordering::SeqCst);
        if refuse > 0 {
            self.server.refuse.store(refuse - 1, Ordering::SeqCst);
            return Err(AgentError::connector("connection refused"));
        }
        Ok(self.server.next_connection.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn is_alive(&self, connection: &usize) -> bool {
        self.server.is_alive(*connection)
    }

    async fn add_listener(&self, connection: &usize, binding: &ListenerBinding) -> Result<()> {
        if !self.server.is_alive(*connection) {
            return Err(AgentError::ConnectionLost("connection reset".to_string()));
        }
        self.server
            .listeners
            .lock()
            .entry(*connection)
            .or_default()
            .push(binding.target().to_string());
        Ok(())
    }

    async fn remove_listener(&self, connection: &usize, binding: &ListenerBinding) -> Result<()> {
        if let Some(targets) = self.server.listeners.lock().get_mut(connection) {
            targets.retain(|t| t != binding.target());
        }
        Ok(())
    }

    async fn close(&self, connection: &usize) {
        self.server.listeners.lock().remove(connection);
    }
}

pub type RemoteManager = ConnectionManager<FakeFactory>;

/// Connector for a [`FakeServer`]: attributes are `float64` values read over
/// the managed connection; every category is its own native listener target.
pub struct RemoteConnector {
    server: Arc<FakeServer>,
    manager: Arc<RemoteManager>,
    timeout: Duration,
    emitter: Mutex<Option<NotificationEmitter>>,
}

impl RemoteConnector {
    pub fn new(server: Arc<FakeServer>, manager: Arc<RemoteManager>) -> Arc<Self> {
        Arc::new(Self {
            server,
            manager,
            timeout: Duration::from_secs(2),
            emitter: Mutex::new(None),
        })
    }

    /// A connector whose manager comes from `agent`, so the agent's
    /// connection settings apply.
    pub fn for_agent(server: Arc<FakeServer>, agent: &Agent) -> Arc<Self> {
        let manager = agent.connection_manager(FakeFactory::new(server.clone()));
        Arc::new(Self {
            server,
            manager,
            timeout: agent.connection_settings().operation_timeout,
            emitter: Mutex::new(None),
        })
    }

    pub fn manager(&self) -> &Arc<RemoteManager> {
        &self.manager
    }

    /// The server raises `category`. Delivered only when a live connection
    /// carries the listener registration.
    pub async fn push(&self, category: &str, message: &str) -> Option<InvocationReport> {
        if !self.server.is_listening(category) {
            return None;
        }
        let emitter = self.emitter.lock().clone()?;
        Some(emitter.emit(Notification::new(category, message)).await)
    }
}

struct RemoteAccessor {
    ty: CanonicalType,
    server: Arc<FakeServer>,
    manager: Arc<RemoteManager>,
    timeout: Duration,
    name: String,
}

#[async_trait]
impl AttributeAccessor for RemoteAccessor {
    fn canonical_type(&self) -> &CanonicalType {
        &self.ty
    }

    fn is_writable(&self) -> bool {
        false
    }

    async fn read(&self) -> Result<AttributeValue> {
        let server = self.server.clone();
        let name = self.name.clone();
        let value = self
            .manager
            .with_connection(self.timeout, move |connection| async move {
                server.read(*connection, &name)
            })
            .await?;
        Ok(AttributeValue::scalar(value)?)
    }

    async fn write(&self, _value: AttributeValue) -> Result<()> {
        Err(AgentError::Unsupported("read-only".to_string()))
    }
}

#[async_trait]
impl AttributeSource for RemoteConnector {
    async fn connect_attribute(
        &self,
        attribute_name: &str,
        _options: &Options,
    ) -> Result<Option<SharedAccessor>> {
        if !self.server.values.lock().contains_key(attribute_name) {
            return Ok(None);
        }
        Ok(Some(Arc::new(RemoteAccessor {
            ty: CanonicalType::Float64,
            server: self.server.clone(),
            manager: self.manager.clone(),
            timeout: self.timeout,
            name: attribute_name.to_string(),
        })))
    }
}

#[async_trait]
impl NotificationSource for RemoteConnector {
    fn bind_emitter(&self, emitter: NotificationEmitter) {
        *self.emitter.lock() = Some(emitter);
    }

    async fn enable_notifications(
        &self,
        category: &str,
        _options: &Options,
    ) -> Result<Option<NotificationDeclaration>> {
        Ok(Some(
            NotificationDeclaration::new(Severity::Notice).with_endpoint(category),
        ))
    }

    fn listener_control(&self) -> Option<Arc<dyn ListenerControl>> {
        Some(self.manager.clone())
    }
}
