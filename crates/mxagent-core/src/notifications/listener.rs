use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::Notification;

/// Gateway-side consumer of notifications.
#[async_trait]
pub trait NotificationListener: Send + Sync {
    async fn handle(&self, notification: &Notification) -> anyhow::Result<()>;

    /// Whether the consumer behind this listener still exists. Dead
    /// listeners are pruned by the registry on the next delivery.
    fn is_alive(&self) -> bool {
        true
    }
}

pub type SharedListener = Arc<dyn NotificationListener>;

/// Adapter for synchronous closures.
pub struct FnListener<F>(F);

pub fn listener_fn<F>(f: F) -> Arc<FnListener<F>>
where
    F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}

#[async_trait]
impl<F> NotificationListener for FnListener<F>
where
    F: Fn(&Notification) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, notification: &Notification) -> anyhow::Result<()> {
        (self.0)(notification)
    }
}

/// Forwards notifications into an unbounded channel; dead once the
/// receiving side is dropped.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl NotificationListener for ChannelListener {
    async fn handle(&self, notification: &Notification) -> anyhow::Result<()> {
        self.tx
            .send(notification.clone())
            .map_err(|_| anyhow!("notification receiver dropped"))
    }

    fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}
