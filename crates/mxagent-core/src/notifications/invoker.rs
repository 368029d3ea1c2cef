//! Listener invocation strategies
//!
//! - **Parallel**: one task per listener, failures and panics are captured
//!   and handed to the error handler
//! - **Sequential**: registration order, the first failure aborts the rest of
//!   that one delivery

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::warn;

use super::{Notification, SharedListener};
use crate::event::AgentEvent;
use crate::event_bus::EventSender;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationMode {
    #[default]
    Parallel,
    Sequential,
}

/// Receives every listener failure. Must not panic.
pub type ErrorHandler = Arc<dyn Fn(&Notification, &anyhow::Error) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvocationReport {
    pub delivered: usize,
    pub failed: usize,
    /// Listeners not invoked because a sequential delivery was aborted
    pub skipped: usize,
}

impl InvocationReport {
    pub fn merge(&mut self, other: InvocationReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

#[derive(Clone)]
pub struct ListenerInvoker {
    mode: InvocationMode,
    limit: Option<Arc<Semaphore>>,
    error_handler: ErrorHandler,
    events: Option<EventSender>,
}

impl fmt::Debug for ListenerInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerInvoker")
            .field("mode", &self.mode)
            .field("max_concurrency", &self.limit.as_ref().map(|s| s.available_permits()))
            .finish()
    }
}

impl Default for ListenerInvoker {
    fn default() -> Self {
        Self::new(InvocationMode::Parallel)
    }
}

impl ListenerInvoker {
    pub fn new(mode: InvocationMode) -> Self {
        Self {
            mode,
            limit: None,
            error_handler: Arc::new(log_failure),
            events: None,
        }
    }

    pub fn parallel() -> Self {
        Self::new(InvocationMode::Parallel)
    }

    pub fn sequential() -> Self {
        Self::new(InvocationMode::Sequential)
    }

    /// Bound the number of listener tasks running at once (parallel mode).
    pub fn with_max_concurrency(mut self, permits: usize) -> Self {
        self.limit = Some(Arc::new(Semaphore::new(permits.max(1))));
        self
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn with_event_sender(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn mode(&self) -> InvocationMode {
        self.mode
    }

    pub async fn invoke(
        &self,
        notification: &Notification,
        listeners: &[SharedListener],
    ) -> InvocationReport {
        match self.mode {
            InvocationMode::Parallel => self.invoke_parallel(notification, listeners).await,
            InvocationMode::Sequential => self.invoke_sequential(notification, listeners).await,
        }
    }

    async fn invoke_parallel(
        &self,
        notification: &Notification,
        listeners: &[SharedListener],
    ) -> InvocationReport {
        let shared = Arc::new(notification.clone());
        let tasks: Vec<_> = listeners
            .iter()
            .cloned()
            .map(|listener| {
                let notification = shared.clone();
                let limit = self.limit.clone();
                tokio::spawn(async move {
                    let _permit = match limit {
                        Some(semaphore) => semaphore.acquire_owned().await.ok(),
                        None => None,
                    };
                    listener.handle(&notification).await
                })
            })
            .collect();

        let mut report = InvocationReport::default();
        for result in futures::future::join_all(tasks).await {
            match result {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(error)) => {
                    report.failed += 1;
                    self.report_failure(notification, &error);
                }
                Err(join_error) => {
                    report.failed += 1;
                    let error = if join_error.is_panic() {
                        anyhow!("listener panicked: {}", panic_message(join_error.into_panic()))
                    } else {
                        anyhow!("listener task cancelled")
                    };
                    self.report_failure(notification, &error);
                }
            }
        }
        report
    }

    async fn invoke_sequential(
        &self,
        notification: &Notification,
        listeners: &[SharedListener],
    ) -> InvocationReport {
        let mut report = InvocationReport::default();
        for (i, listener) in listeners.iter().enumerate() {
            let outcome = AssertUnwindSafe(listener.handle(notification))
                .catch_unwind()
                .await;
            let error = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(error)) => error,
                Err(payload) => anyhow!("listener panicked: {}", panic_message(payload)),
            };
            report.failed += 1;
            report.skipped = listeners.len() - i - 1;
            self.report_failure(notification, &error);
            break;
        }
        report
    }

    fn report_failure(&self, notification: &Notification, error: &anyhow::Error) {
        (self.error_handler)(notification, error);
        if let Some(events) = &self.events {
            events.emit(AgentEvent::ListenerFailed {
                category: notification.category.clone(),
                error: error.to_string(),
            });
        }
    }
}

fn log_failure(notification: &Notification, error: &anyhow::Error) {
    warn!(
        source = %notification.source,
        category = %notification.category,
        sequence = notification.sequence_number,
        error = %error,
        "[ListenerInvoker] Listener failed"
    );
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
