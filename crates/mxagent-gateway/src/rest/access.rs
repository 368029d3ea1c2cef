//! Authorization hook
//!
//! Authentication and role mechanics belong to the hosting deployment; the
//! REST gateway only asks an injected guard before touching the core.

use std::sync::Arc;

use axum::http::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Directory listings
    List,
    Read,
    Write,
    Listen,
}

pub trait AccessGuard: Send + Sync {
    fn authorize(&self, headers: &HeaderMap, access: Access, resource: Option<&str>) -> bool;
}

pub type SharedAccessGuard = Arc<dyn AccessGuard>;

/// Default guard: every request is allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessGuard for AllowAll {
    fn authorize(&self, _headers: &HeaderMap, _access: Access, _resource: Option<&str>) -> bool {
        true
    }
}
