//! REST gateway
//!
//! | Method | Path                                   | Contract call        |
//! |--------|----------------------------------------|----------------------|
//! | GET    | `/health`                              | -                    |
//! | GET    | `/attributes[?resource=]`              | `list_attributes`    |
//! | GET    | `/notifications[?resource=]`           | `list_notifications` |
//! | GET    | `/{resource}/{attribute}`              | `get_attribute`      |
//! | POST   | `/{resource}/{attribute}`              | `set_attribute`      |
//! | GET    | `/{resource}/notifications[?category=&filter=]` | `listen` (SSE) |
//!
//! An attribute literally named `notifications` is shadowed by the stream
//! route.

pub mod access;
mod error;
mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

pub use access::{Access, AccessGuard, AllowAll, SharedAccessGuard};
pub use error::{status_of, ApiError};

use crate::contract::{JsonCodec, ResourceGateway};

#[derive(Clone)]
pub struct RestState {
    pub gateway: ResourceGateway<JsonCodec>,
    pub guard: SharedAccessGuard,
}

impl RestState {
    pub fn new(gateway: ResourceGateway<JsonCodec>) -> Self {
        Self {
            gateway,
            guard: Arc::new(AllowAll),
        }
    }

    pub fn with_guard(mut self, guard: SharedAccessGuard) -> Self {
        self.guard = guard;
        self
    }
}

pub fn router(state: RestState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/attributes", get(handlers::list_attributes))
        .route("/notifications", get(handlers::list_notifications))
        .route("/{resource}/notifications", get(handlers::listen))
        .route(
            "/{resource}/{attribute}",
            get(handlers::get_attribute).post(handlers::set_attribute),
        )
        .with_state(state)
}
