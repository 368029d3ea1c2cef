//! Notifications
//!
//! - **NotificationRegistry**: enabled categories, subscriptions, fan-out
//! - **ListenerInvoker**: parallel or sequential delivery with failure isolation
//! - **NotificationFilter**: subscription-side filter expressions

mod filter;
mod invoker;
mod listener;
mod metadata;
mod notification;
mod registry;
mod severity;

pub use filter::NotificationFilter;
pub use invoker::{ErrorHandler, InvocationMode, InvocationReport, ListenerInvoker};
pub use listener::{listener_fn, ChannelListener, FnListener, NotificationListener, SharedListener};
pub use metadata::NotificationMetadata;
pub use notification::Notification;
pub use registry::{NotificationEmitter, NotificationRegistry, SubscriptionHandle};
pub use severity::Severity;
