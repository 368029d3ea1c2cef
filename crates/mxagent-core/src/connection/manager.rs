//! ConnectionManager - owns the physical connection to one back-end endpoint
//!
//! - `with_connection` runs an operation against the live connection,
//!   reconnecting first when the connection is not usable
//! - reconnects are single-flight: concurrent callers wait for the one
//!   attempt in progress instead of starting their own
//! - native listener bindings are replayed on every new connection while the
//!   binding list is locked, so a binding added during a reconnect is never lost
//!
//! Lock order: `reconnect` -> `bindings` -> `connection`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{ConnectionState, RetryPolicy};
use crate::connector::ListenerControl;
use crate::error::{AgentError, Result};
use crate::event::AgentEvent;
use crate::event_bus::EventSender;

/// Back-end specific half of a managed connection.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    /// Human-readable endpoint, used in logs and events.
    fn endpoint(&self) -> &str;

    async fn connect(&self) -> Result<Self::Connection>;

    /// Cheap liveness check used by the health check.
    async fn is_alive(&self, connection: &Self::Connection) -> bool;

    async fn add_listener(
        &self,
        connection: &Self::Connection,
        binding: &ListenerBinding,
    ) -> Result<()>;

    async fn remove_listener(
        &self,
        connection: &Self::Connection,
        binding: &ListenerBinding,
    ) -> Result<()>;

    async fn close(&self, _connection: &Self::Connection) {}
}

/// A connection together with the generation it was installed under.
type Live<C> = (Arc<C>, u64);

/// A native listener registration that must survive reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerBinding {
    target: String,
}

impl ListenerBinding {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    /// Native endpoint listened at, e.g. an object name.
    pub fn target(&self) -> &str {
        &self.target
    }
}

pub struct ConnectionManager<F: ConnectionFactory> {
    factory: F,
    policy: RetryPolicy,
    connection: RwLock<Option<Arc<F::Connection>>>,
    /// Bumped on every new connection; failures from older ones are ignored
    generation: AtomicU64,
    state: watch::Sender<ConnectionState>,
    reconnect: Mutex<()>,
    bindings: Mutex<Vec<ListenerBinding>>,
    closed: AtomicBool,
    health_check: parking_lot::Mutex<Option<JoinHandle<()>>>,
    events: Option<EventSender>,
}

impl<F: ConnectionFactory> ConnectionManager<F> {
    pub fn new(factory: F, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            factory,
            policy,
            connection: RwLock::new(None),
            generation: AtomicU64::new(0),
            state,
            reconnect: Mutex::new(()),
            bindings: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            health_check: parking_lot::Mutex::new(None),
            events: None,
        }
    }

    pub fn with_event_sender(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn endpoint(&self) -> &str {
        self.factory.endpoint()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub async fn bindings(&self) -> Vec<ListenerBinding> {
        self.bindings.lock().await.clone()
    }

    // ========================================================================
    // Connect / operate
    // ========================================================================

    /// Establish the connection if it is not usable yet.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_connected().await.map(|_| ())
    }

    /// Run `op` against the live connection.
    ///
    /// `timeout` covers reconnecting and the operation together. Running out
    /// of time while reconnecting yields `ConnectionUnavailable`, during the
    /// operation `Timeout`. An operation failing with a connection error
    /// marks the connection `Degraded`; it is not retried.
    pub async fn with_connection<T, Op, Fut>(&self, timeout: Duration, op: Op) -> Result<T>
    where
        Op: FnOnce(Arc<F::Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = Instant::now() + timeout;
        let (connection, generation) =
            match tokio::time::timeout_at(deadline, self.ensure_connected()).await {
                Ok(live) => live?,
                Err(_) => {
                    return Err(AgentError::ConnectionUnavailable(format!(
                        "{}: not reconnected within {:?}",
                        self.endpoint(),
                        timeout
                    )))
                }
            };

        match tokio::time::timeout_at(deadline, op(connection)).await {
            Err(_) => Err(AgentError::Timeout(timeout)),
            Ok(Err(e)) if e.is_connection_failure() => {
                self.mark_degraded(generation, &e);
                Err(e)
            }
            Ok(result) => result,
        }
    }

    /// The live connection with the generation it was installed under.
    /// Both are read under one guard; `install` changes them under the
    /// write guard.
    async fn live_connection(&self) -> Option<Live<F::Connection>> {
        if !self.state().is_usable() {
            return None;
        }
        let slot = self.connection.read().await;
        let connection = slot.clone()?;
        Some((connection, self.generation.load(Ordering::SeqCst)))
    }

    async fn ensure_connected(&self) -> Result<Live<F::Connection>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::ConnectionUnavailable(format!(
                "{}: connection manager closed",
                self.endpoint()
            )));
        }
        if let Some(live) = self.live_connection().await {
            return Ok(live);
        }
        self.reestablish().await
    }

    /// Single-flight reconnect with replay.
    async fn reestablish(&self) -> Result<Live<F::Connection>> {
        let _flight = self.reconnect.lock().await;

        // Another caller may have finished while we waited
        if let Some(live) = self.live_connection().await {
            return Ok(live);
        }

        let attempting = match self.state() {
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                ConnectionState::Connecting
            }
            _ => ConnectionState::Reconnecting,
        };
        self.transition(attempting);

        let stale = self.connection.write().await.take();
        if let Some(stale) = stale {
            self.factory.close(&stale).await;
        }

        let attempts = self.policy.attempts();
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.factory.connect().await {
                Ok(connection) => {
                    let connection = Arc::new(connection);
                    match self.install(connection.clone()).await {
                        Ok(generation) => return Ok((connection, generation)),
                        Err(e) => {
                            warn!(
                                endpoint = %self.endpoint(),
                                attempt,
                                error = %e,
                                "[ConnectionManager] Listener replay failed"
                            );
                            self.factory.close(&connection).await;
                            last_error = Some(e);
                        }
                    }
                }
                Err(e) => {
                    debug!(
                        endpoint = %self.endpoint(),
                        attempt,
                        error = %e,
                        "[ConnectionManager] Connection attempt failed"
                    );
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.delay(attempt)).await;
            }
        }

        self.transition(ConnectionState::Failed);
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        warn!(
            endpoint = %self.endpoint(),
            attempts,
            error = %reason,
            "[ConnectionManager] Reconnect exhausted"
        );
        Err(AgentError::ConnectionUnavailable(format!(
            "{} after {} attempt(s): {}",
            self.endpoint(),
            attempts,
            reason
        )))
    }

    /// Replay every binding onto `connection`, then publish it as Connected.
    async fn install(&self, connection: Arc<F::Connection>) -> Result<u64> {
        let bindings = self.bindings.lock().await;
        for binding in bindings.iter() {
            self.factory.add_listener(&connection, binding).await?;
        }
        let replayed = bindings.len();

        let mut slot = self.connection.write().await;
        *slot = Some(connection);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        drop(slot);
        self.transition(ConnectionState::Connected);
        drop(bindings);

        if replayed > 0 {
            info!(
                endpoint = %self.endpoint(),
                count = replayed,
                "[ConnectionManager] Listener bindings replayed"
            );
            self.emit(AgentEvent::ListenersReplayed {
                endpoint: self.endpoint().to_string(),
                count: replayed,
            });
        }
        Ok(generation)
    }

    fn mark_degraded(&self, generation: u64, error: &AgentError) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        let changed = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Degraded;
                true
            } else {
                false
            }
        });
        if changed {
            warn!(
                endpoint = %self.endpoint(),
                error = %error,
                "[ConnectionManager] Connection degraded"
            );
            self.emit_transition(ConnectionState::Connected, ConnectionState::Degraded);
        }
    }

    fn transition(&self, to: ConnectionState) {
        let from = self.state.send_replace(to);
        if from != to {
            debug!(
                endpoint = %self.endpoint(),
                from = %from,
                to = %to,
                "[ConnectionManager] State changed"
            );
            self.emit_transition(from, to);
        }
    }

    fn emit_transition(&self, from: ConnectionState, to: ConnectionState) {
        self.emit(AgentEvent::ConnectionStateChanged {
            endpoint: self.endpoint().to_string(),
            from,
            to,
            at: Utc::now(),
        });
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop the physical connection without touching listener bindings.
    ///
    /// The next operation (or health check) reconnects and replays them.
    pub async fn simulate_connection_abort(&self) {
        let _flight = self.reconnect.lock().await;
        let connection = self.connection.write().await.take();
        if let Some(connection) = connection {
            self.factory.close(&connection).await;
        }
        info!(endpoint = %self.endpoint(), "[ConnectionManager] Connection aborted");
        self.transition(ConnectionState::Disconnected);
    }

    /// Probe the connection every `interval`, reconnecting when it is dead.
    ///
    /// The loop holds a weak reference and ends once the manager is dropped.
    pub fn start_health_check(self: &Arc<Self>, interval: Duration) {
        let manager: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if manager.closed.load(Ordering::SeqCst) {
                    break;
                }
                manager.check_health().await;
            }
        });
        if let Some(previous) = self.health_check.lock().replace(handle) {
            previous.abort();
        }
        debug!(
            endpoint = %self.endpoint(),
            interval_ms = interval.as_millis() as u64,
            "[ConnectionManager] Health check started"
        );
    }

    pub fn stop_health_check(&self) {
        if let Some(handle) = self.health_check.lock().take() {
            handle.abort();
        }
    }

    async fn check_health(&self) {
        if let Some((connection, generation)) = self.live_connection().await {
            if self.factory.is_alive(&connection).await {
                return;
            }
            self.mark_degraded(
                generation,
                &AgentError::ConnectionLost("health check failed".to_string()),
            );
        }
        if let Err(e) = self.reestablish().await {
            debug!(
                endpoint = %self.endpoint(),
                error = %e,
                "[ConnectionManager] Health check reconnect failed"
            );
        }
    }

    /// Close for good: stop the health check, drop the connection and
    /// every binding. Later operations fail with `ConnectionUnavailable`.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop_health_check();
        let _flight = self.reconnect.lock().await;
        let mut bindings = self.bindings.lock().await;
        let connection = self.connection.write().await.take();
        if let Some(connection) = connection {
            for binding in bindings.iter() {
                if let Err(e) = self.factory.remove_listener(&connection, binding).await {
                    debug!(
                        endpoint = %self.endpoint(),
                        target = %binding.target(),
                        error = %e,
                        "[ConnectionManager] Listener removal failed on close"
                    );
                }
            }
            self.factory.close(&connection).await;
        }
        bindings.clear();
        self.transition(ConnectionState::Disconnected);
        info!(endpoint = %self.endpoint(), "[ConnectionManager] Closed");
    }
}

impl<F: ConnectionFactory> Drop for ConnectionManager<F> {
    fn drop(&mut self) {
        if let Some(handle) = self.health_check.get_mut().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl<F: ConnectionFactory> ListenerControl for ConnectionManager<F> {
    /// Record the binding and apply it to the live connection, if any.
    ///
    /// Without a live connection the binding is only recorded; it is applied
    /// by the next reconnect.
    async fn start_listening(&self, endpoint: &str) -> Result<()> {
        let binding = ListenerBinding::new(endpoint);
        let mut bindings = self.bindings.lock().await;
        if bindings.contains(&binding) {
            return Ok(());
        }
        if let Some((connection, generation)) = self.live_connection().await {
            match self.factory.add_listener(&connection, &binding).await {
                Ok(()) => {}
                Err(e) if e.is_connection_failure() => {
                    self.mark_degraded(generation, &e);
                }
                Err(e) => return Err(e),
            }
        }
        bindings.push(binding);
        debug!(
            endpoint = %self.endpoint(),
            target = %endpoint,
            "[ConnectionManager] Listening started"
        );
        Ok(())
    }

    async fn stop_listening(&self, endpoint: &str) -> Result<()> {
        let binding = ListenerBinding::new(endpoint);
        let mut bindings = self.bindings.lock().await;
        let before = bindings.len();
        bindings.retain(|b| b != &binding);
        if bindings.len() == before {
            return Ok(());
        }
        if let Some((connection, _)) = self.live_connection().await {
            if let Err(e) = self.factory.remove_listener(&connection, &binding).await {
                warn!(
                    endpoint = %self.endpoint(),
                    target = %endpoint,
                    error = %e,
                    "[ConnectionManager] Listener removal failed"
                );
            }
        }
        debug!(
            endpoint = %self.endpoint(),
            target = %endpoint,
            "[ConnectionManager] Listening stopped"
        );
        Ok(())
    }
}
