//! Event Bus - distribution of agent events
//!
//! Registries and connection managers hold an [`EventSender`]; any number of
//! consumers subscribe and receive every event emitted after they joined.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Event Bus (broadcast channel)               │
//! │                                                              │
//! │  Producers:                   Consumers:                     │
//! │  ├─ AttributeRegistry         ├─ Gateway audit log           │
//! │  ├─ NotificationRegistry      ├─ Health endpoint             │
//! │  └─ ConnectionManager         └─ Tests                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::event::AgentEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast hub; every subscriber gets its own copy of every event.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheaply cloneable emitting half of the bus.
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<AgentEvent>,
}

impl EventSender {
    /// Emit an event. Returns the number of receivers; zero is not an error.
    pub fn emit(&self, event: AgentEvent) -> usize {
        let type_name = event.type_name();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(
                    event_type = type_name,
                    receivers = count,
                    "[EventBus] Emitted event"
                );
                count
            }
            Err(_) => {
                debug!(event_type = type_name, "[EventBus] No receivers for event");
                0
            }
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Receiving half; skips over lag instead of failing.
pub struct EventReceiver {
    receiver: broadcast::Receiver<AgentEvent>,
}

impl EventReceiver {
    /// Next event, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        skipped_events = skipped,
                        "[EventBus] Receiver lagged, skipped {} events", skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("[EventBus] Channel closed");
                    return None;
                }
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(
                    skipped_events = skipped,
                    "[EventBus] Receiver lagged on try_recv"
                );
                self.receiver.try_recv().ok()
            }
            Err(_) => None,
        }
    }
}

pub type SharedEventBus = Arc<EventBus>;

// ============================================================================
// TESTS
// ============================================================================
