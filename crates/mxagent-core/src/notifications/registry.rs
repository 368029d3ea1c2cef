//! Notification Registry
//!
//! Holds enabled notifications keyed by composite identifier, the
//! subscriptions attached to each, and the per-endpoint listening refcount.
//!
//! Locking:
//! - `structure` (async mutex) serializes enable/disable/subscribe
//! - each entry keeps its subscriptions behind its own short `RwLock`
//! - delivery only snapshots listener lists and never holds a lock while a
//!   listener runs

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    InvocationReport, ListenerInvoker, Notification, NotificationFilter, NotificationMetadata,
    SharedListener,
};
use crate::connector::{ListenerControl, NotificationSource};
use crate::error::{AgentError, Result};
use crate::event::AgentEvent;
use crate::event_bus::EventSender;
use crate::identifier::{CompositeId, IdScheme};
use crate::license::{Feature, LicensePolicy, SharedLicensePolicy, Unlimited};
use crate::options::Options;
use crate::types::{convert, AttributeValue};

/// Returned by `subscribe`; the owner releases it with `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: Uuid,
    key: String,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Composite identifier of the notification subscribed to.
    pub fn key(&self) -> &str {
        &self.key
    }
}

struct Subscription {
    id: Uuid,
    listener: SharedListener,
    filter: Option<NotificationFilter>,
}

struct Entry {
    metadata: NotificationMetadata,
    category_key: String,
    subscriptions: RwLock<Vec<Subscription>>,
}

struct EndpointUse {
    control: Option<Arc<dyn ListenerControl>>,
    refs: usize,
}

pub struct NotificationRegistry {
    scheme: IdScheme,
    sources: DashMap<String, Arc<dyn NotificationSource>>,
    entries: DashMap<String, Arc<Entry>>,
    /// `resource<sep>category` -> entry keys enabled for that category
    categories: DashMap<String, Vec<String>>,
    endpoints: Mutex<HashMap<(String, String), EndpointUse>>,
    structure: tokio::sync::Mutex<()>,
    invoker: ListenerInvoker,
    detached_delivery: bool,
    sequence: AtomicU64,
    license: SharedLicensePolicy,
    events: Option<EventSender>,
}

impl NotificationRegistry {
    pub fn new(scheme: IdScheme) -> Self {
        Self {
            scheme,
            sources: DashMap::new(),
            entries: DashMap::new(),
            categories: DashMap::new(),
            endpoints: Mutex::new(HashMap::new()),
            structure: tokio::sync::Mutex::new(()),
            invoker: ListenerInvoker::default(),
            detached_delivery: false,
            sequence: AtomicU64::new(1),
            license: Arc::new(Unlimited),
            events: None,
        }
    }

    pub fn with_invoker(mut self, invoker: ListenerInvoker) -> Self {
        self.invoker = invoker;
        self
    }

    /// Deliver connector-raised notifications on a spawned task instead of
    /// the connector's own.
    pub fn with_detached_delivery(mut self, detached: bool) -> Self {
        self.detached_delivery = detached;
        self
    }

    pub fn with_license(mut self, license: Arc<dyn LicensePolicy>) -> Self {
        self.license = license;
        self
    }

    pub fn with_event_sender(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn scheme(&self) -> &IdScheme {
        &self.scheme
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Register the notification capability of a resource and hand it an
    /// emitter bound to this registry.
    pub fn register_resource(
        self: &Arc<Self>,
        resource: &str,
        source: Arc<dyn NotificationSource>,
    ) -> Result<()> {
        self.scheme.validate_resource(resource)?;
        source.bind_emitter(NotificationEmitter {
            registry: Arc::downgrade(self),
            resource: resource.to_string(),
        });
        self.sources.insert(resource.to_string(), source);
        debug!(resource = %resource, "[NotificationRegistry] Resource registered");
        Ok(())
    }

    /// Disable every notification of the resource and forget its source.
    pub async fn unregister_resource(&self, resource: &str) -> usize {
        let disabled = self.disable_resource(resource).await;
        self.sources.remove(resource);
        disabled
    }

    fn source(&self, resource: &str) -> Result<Arc<dyn NotificationSource>> {
        self.sources
            .get(resource)
            .map(|s| s.value().clone())
            .ok_or_else(|| AgentError::not_found(format!("resource '{}'", resource)))
    }

    fn entry(&self, key: &str) -> Option<Arc<Entry>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    // ========================================================================
    // Enable / disable
    // ========================================================================

    /// Enable `category` under `(resource, name)`.
    ///
    /// Returns `Ok(None)` when the connector does not support the category.
    /// Enabling the same identifier with the same category again returns the
    /// existing metadata; a different category replaces it and keeps the
    /// subscriptions.
    pub async fn enable(
        &self,
        resource: &str,
        name: &str,
        category: &str,
        options: Options,
    ) -> Result<Option<NotificationMetadata>> {
        let id = self.scheme.compose(resource, name)?;
        let category_key = self.scheme.compose(resource, category)?.into_key();
        let source = self.source(resource)?;

        let _guard = self.structure.lock().await;

        let previous = self.entry(id.as_str());
        if let Some(previous) = &previous {
            if previous.metadata.category == category {
                return Ok(Some(previous.metadata.clone()));
            }
        } else {
            self.license
                .check(Feature::Notification, self.entries.len())?;
        }

        let Some(declaration) = source.enable_notifications(category, &options).await? else {
            debug!(
                resource = %resource,
                category = %category,
                "[NotificationRegistry] Category not supported by connector"
            );
            return Ok(None);
        };

        if let Some(endpoint) = &declaration.endpoint {
            if let Err(e) = self.acquire_endpoint(resource, endpoint, &source).await {
                if !self.categories.contains_key(&category_key) {
                    if let Err(disable_err) = source.disable_notifications(category).await {
                        warn!(error = %disable_err, "[NotificationRegistry] Rollback failed");
                    }
                }
                return Err(e);
            }
        }

        let metadata = NotificationMetadata {
            resource: resource.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            attachment_type: declaration.attachment_type,
            severity: declaration.severity,
            endpoint: declaration.endpoint.clone(),
            options,
        };
        let carried = previous
            .as_ref()
            .map(|p| std::mem::take(&mut *p.subscriptions.write()))
            .unwrap_or_default();
        let entry = Arc::new(Entry {
            metadata: metadata.clone(),
            category_key: category_key.clone(),
            subscriptions: RwLock::new(carried),
        });

        self.entries.insert(id.as_str().to_string(), entry);
        self.categories
            .entry(category_key)
            .or_default()
            .push(id.as_str().to_string());

        if let Some(previous) = previous {
            self.retire(&id, &previous).await;
        }

        info!(
            resource = %resource,
            name = %name,
            category = %category,
            endpoint = ?declaration.endpoint,
            "[NotificationRegistry] Notification enabled"
        );
        self.emit(AgentEvent::NotificationEnabled {
            resource: resource.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            endpoint: declaration.endpoint,
        });
        Ok(Some(metadata))
    }

    /// Disable `(resource, name)`. Returns `false` if it was not enabled.
    pub async fn disable(&self, resource: &str, name: &str) -> Result<bool> {
        let id = self.scheme.compose(resource, name)?;
        let _guard = self.structure.lock().await;
        match self.entries.remove(id.as_str()) {
            Some((_, entry)) => {
                self.retire(&id, &entry).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Disable every notification of a resource. Safe for resources with
    /// nothing enabled.
    pub async fn disable_resource(&self, resource: &str) -> usize {
        let _guard = self.structure.lock().await;
        let ids: Vec<CompositeId> = self
            .entries
            .iter()
            .filter_map(|e| self.scheme.parse(e.key()).ok())
            .filter(|id| id.resource() == resource)
            .collect();
        let mut disabled = 0;
        for id in ids {
            if let Some((_, entry)) = self.entries.remove(id.as_str()) {
                self.retire(&id, &entry).await;
                disabled += 1;
            }
        }
        disabled
    }

    /// Undo the side effects of an entry that is no longer in `entries`.
    async fn retire(&self, id: &CompositeId, entry: &Entry) {
        let metadata = &entry.metadata;
        let last_for_category = match self.categories.get_mut(&entry.category_key) {
            Some(mut keys) => {
                keys.retain(|k| k != id.as_str());
                keys.is_empty()
            }
            None => true,
        };
        if last_for_category {
            self.categories
                .remove_if(&entry.category_key, |_, keys| keys.is_empty());
            if let Ok(source) = self.source(&metadata.resource) {
                if let Err(e) = source.disable_notifications(&metadata.category).await {
                    warn!(
                        resource = %metadata.resource,
                        category = %metadata.category,
                        error = %e,
                        "[NotificationRegistry] Connector failed to disable category"
                    );
                }
            }
        }
        if let Some(endpoint) = &metadata.endpoint {
            self.release_endpoint(&metadata.resource, endpoint).await;
        }
        entry.subscriptions.write().clear();

        info!(
            resource = %metadata.resource,
            name = %metadata.name,
            category = %metadata.category,
            "[NotificationRegistry] Notification disabled"
        );
        self.emit(AgentEvent::NotificationDisabled {
            resource: metadata.resource.clone(),
            name: metadata.name.clone(),
            category: metadata.category.clone(),
        });
    }

    async fn acquire_endpoint(
        &self,
        resource: &str,
        endpoint: &str,
        source: &Arc<dyn NotificationSource>,
    ) -> Result<()> {
        let key = (resource.to_string(), endpoint.to_string());
        {
            let mut endpoints = self.endpoints.lock();
            if let Some(usage) = endpoints.get_mut(&key) {
                usage.refs += 1;
                return Ok(());
            }
        }
        let control = source.listener_control();
        if let Some(control) = &control {
            control.start_listening(endpoint).await?;
            debug!(
                resource = %resource,
                endpoint = %endpoint,
                "[NotificationRegistry] Started listening"
            );
        }
        self.endpoints
            .lock()
            .insert(key, EndpointUse { control, refs: 1 });
        Ok(())
    }

    async fn release_endpoint(&self, resource: &str, endpoint: &str) {
        let key = (resource.to_string(), endpoint.to_string());
        let control = {
            let mut endpoints = self.endpoints.lock();
            match endpoints.get_mut(&key) {
                Some(usage) if usage.refs > 1 => {
                    usage.refs -= 1;
                    return;
                }
                Some(_) => endpoints.remove(&key).and_then(|u| u.control),
                None => return,
            }
        };
        if let Some(control) = control {
            match control.stop_listening(endpoint).await {
                Ok(()) => debug!(
                    resource = %resource,
                    endpoint = %endpoint,
                    "[NotificationRegistry] Stopped listening"
                ),
                Err(e) => warn!(
                    resource = %resource,
                    endpoint = %endpoint,
                    error = %e,
                    "[NotificationRegistry] Failed to stop listening"
                ),
            }
        }
    }

    /// Number of enabled notifications currently using an endpoint.
    pub fn endpoint_refs(&self, resource: &str, endpoint: &str) -> usize {
        self.endpoints
            .lock()
            .get(&(resource.to_string(), endpoint.to_string()))
            .map(|u| u.refs)
            .unwrap_or(0)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub async fn subscribe(
        &self,
        resource: &str,
        name: &str,
        listener: SharedListener,
        filter: Option<NotificationFilter>,
    ) -> Result<SubscriptionHandle> {
        let id = self.scheme.compose(resource, name)?;
        let _guard = self.structure.lock().await;
        let entry = self
            .entry(id.as_str())
            .ok_or_else(|| AgentError::not_found(format!("notification '{}'", id)))?;
        let handle = SubscriptionHandle {
            id: Uuid::new_v4(),
            key: id.into_key(),
        };
        entry.subscriptions.write().push(Subscription {
            id: handle.id,
            listener,
            filter: filter.filter(|f| !f.is_match_all()),
        });
        debug!(
            subscription = %handle.id,
            key = %handle.key,
            "[NotificationRegistry] Subscribed"
        );
        Ok(handle)
    }

    /// Subscribe one listener to every notification of `resource`, or only
    /// those of `category`. Delivery stays at most once per notification.
    pub async fn subscribe_resource(
        &self,
        resource: &str,
        category: Option<&str>,
        listener: SharedListener,
        filter: Option<NotificationFilter>,
    ) -> Result<Vec<SubscriptionHandle>> {
        let names: Vec<String> = self
            .metadata_for(resource)
            .into_iter()
            .filter(|m| category.map_or(true, |c| m.category == c))
            .map(|m| m.name)
            .collect();
        if names.is_empty() {
            return Err(AgentError::not_found(match category {
                Some(c) => format!("category '{}' on resource '{}'", c, resource),
                None => format!("notifications on resource '{}'", resource),
            }));
        }
        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            handles.push(
                self.subscribe(resource, &name, listener.clone(), filter.clone())
                    .await?,
            );
        }
        Ok(handles)
    }

    /// Release one subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let Some(entry) = self.entry(&handle.key) else {
            return false;
        };
        let mut subscriptions = entry.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != handle.id);
        before != subscriptions.len()
    }

    /// Drop every subscription. Deliveries already in flight finish; later
    /// fires find no listeners.
    pub fn unsubscribe_all(&self) -> usize {
        let entries: Vec<Arc<Entry>> = self.entries.iter().map(|e| e.value().clone()).collect();
        let mut removed = 0;
        for entry in entries {
            let mut subscriptions = entry.subscriptions.write();
            removed += subscriptions.len();
            subscriptions.clear();
        }
        info!(removed, "[NotificationRegistry] All subscriptions released");
        removed
    }

    pub fn subscription_count(&self, resource: &str, name: &str) -> usize {
        self.scheme
            .compose(resource, name)
            .ok()
            .and_then(|id| self.entry(id.as_str()))
            .map(|e| e.subscriptions.read().len())
            .unwrap_or(0)
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    /// Deliver a notification raised by `notification.source` and wait for
    /// every listener.
    pub async fn fire(&self, notification: Notification) -> InvocationReport {
        let (notification, listeners) = self.prepare(notification);
        if listeners.is_empty() {
            return InvocationReport::default();
        }
        self.invoker.invoke(&notification, &listeners).await
    }

    /// Deliver on a spawned task; the caller does not wait for listeners.
    pub fn fire_detached(&self, notification: Notification) -> JoinHandle<InvocationReport> {
        let (notification, listeners) = self.prepare(notification);
        let invoker = self.invoker.clone();
        tokio::spawn(async move {
            if listeners.is_empty() {
                return InvocationReport::default();
            }
            invoker.invoke(&notification, &listeners).await
        })
    }

    /// Stamp the sequence number, coerce the attachment to its declared type
    /// and snapshot the matching listeners, each at most once.
    fn prepare(&self, mut notification: Notification) -> (Notification, Vec<SharedListener>) {
        if notification.sequence_number == 0 {
            notification.sequence_number = self.sequence.fetch_add(1, Ordering::Relaxed);
        }

        let keys = match self
            .scheme
            .compose(&notification.source, &notification.category)
        {
            Ok(category_key) => self
                .categories
                .get(category_key.as_str())
                .map(|k| k.value().clone())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        let entries: Vec<Arc<Entry>> = keys.iter().filter_map(|k| self.entry(k)).collect();

        if let Some(declared) = entries
            .iter()
            .find_map(|e| e.metadata.attachment_type.as_ref())
        {
            if let Some(attachment) = notification.attachment.take() {
                notification.attachment = if attachment.canonical_type() == declared {
                    Some(attachment)
                } else {
                    match convert(attachment.value(), declared)
                        .and_then(|v| AttributeValue::new(v, declared.clone()))
                    {
                        Ok(coerced) => Some(coerced),
                        Err(e) => {
                            warn!(
                                source = %notification.source,
                                category = %notification.category,
                                error = %e,
                                "[NotificationRegistry] Attachment does not match declared type, dropped"
                            );
                            None
                        }
                    }
                };
            }
        }

        let mut seen = HashSet::new();
        let mut listeners = Vec::new();
        for entry in &entries {
            let mut dead = Vec::new();
            {
                let subscriptions = entry.subscriptions.read();
                for subscription in subscriptions.iter() {
                    if !subscription.listener.is_alive() {
                        dead.push(subscription.id);
                        continue;
                    }
                    if let Some(filter) = &subscription.filter {
                        if !filter.matches(&notification) {
                            continue;
                        }
                    }
                    let identity = Arc::as_ptr(&subscription.listener) as *const () as usize;
                    if seen.insert(identity) {
                        listeners.push(subscription.listener.clone());
                    }
                }
            }
            if !dead.is_empty() {
                entry
                    .subscriptions
                    .write()
                    .retain(|s| !dead.contains(&s.id));
                debug!(
                    pruned = dead.len(),
                    category = %notification.category,
                    "[NotificationRegistry] Pruned dead subscriptions"
                );
            }
        }
        (notification, listeners)
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    pub fn list_resources(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|e| self.scheme.parse(e.key()).ok())
            .map(|id| id.resource().to_string())
            .collect()
    }

    pub fn list_notifications(&self, resource: &str) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|e| self.scheme.parse(e.key()).ok())
            .filter(|id| id.resource() == resource)
            .map(|id| id.name().to_string())
            .collect()
    }

    pub fn metadata(&self, resource: &str, name: &str) -> Option<NotificationMetadata> {
        let id = self.scheme.compose(resource, name).ok()?;
        self.entry(id.as_str()).map(|e| e.metadata.clone())
    }

    pub fn metadata_for(&self, resource: &str) -> Vec<NotificationMetadata> {
        let mut all: Vec<NotificationMetadata> = self
            .entries
            .iter()
            .filter(|e| e.value().metadata.resource == resource)
            .map(|e| e.value().metadata.clone())
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Handle a connector uses to raise notifications for its resource.
#[derive(Clone)]
pub struct NotificationEmitter {
    registry: Weak<NotificationRegistry>,
    resource: String,
}

impl NotificationEmitter {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Raise a notification. With detached delivery configured the report
    /// is empty because listeners run after this returns.
    pub async fn emit(&self, mut notification: Notification) -> InvocationReport {
        let Some(registry) = self.registry.upgrade() else {
            return InvocationReport::default();
        };
        notification.source = self.resource.clone();
        if registry.detached_delivery {
            let _delivery = registry.fire_detached(notification);
            InvocationReport::default()
        } else {
            registry.fire(notification).await
        }
    }

    /// Raise a notification on a spawned task regardless of the configured
    /// delivery mode. `None` once the registry is gone.
    pub fn emit_detached(
        &self,
        mut notification: Notification,
    ) -> Option<JoinHandle<InvocationReport>> {
        let registry = self.registry.upgrade()?;
        notification.source = self.resource.clone();
        Some(registry.fire_detached(notification))
    }
}
