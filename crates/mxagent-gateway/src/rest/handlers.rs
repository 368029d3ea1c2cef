//! HTTP handlers for the REST gateway

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use super::access::Access;
use super::error::ApiError;
use super::RestState;
use mxagent_core::{AttributeDescriptor, NotificationMetadata};

type ApiResult<T> = std::result::Result<T, ApiError>;

fn authorize(
    state: &RestState,
    headers: &HeaderMap,
    access: Access,
    resource: Option<&str>,
) -> ApiResult<()> {
    if state.guard.authorize(headers, access, resource) {
        Ok(())
    } else {
        debug!(access = ?access, resource = ?resource, "[REST] Access denied");
        Err(ApiError::Forbidden(access))
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub resources: usize,
}

pub async fn health(State(state): State<RestState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        resources: state.gateway.agent().resources().len(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub resource: Option<String>,
}

pub async fn list_attributes(
    State(state): State<RestState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<AttributeDescriptor>>> {
    authorize(&state, &headers, Access::List, params.resource.as_deref())?;
    Ok(Json(state.gateway.list_attributes(params.resource.as_deref())))
}

pub async fn list_notifications(
    State(state): State<RestState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<NotificationMetadata>>> {
    authorize(&state, &headers, Access::List, params.resource.as_deref())?;
    Ok(Json(
        state.gateway.list_notifications(params.resource.as_deref()),
    ))
}

pub async fn get_attribute(
    State(state): State<RestState>,
    headers: HeaderMap,
    Path((resource, attribute)): Path<(String, String)>,
) -> ApiResult<Json<JsonValue>> {
    authorize(&state, &headers, Access::Read, Some(&resource))?;
    let value = state.gateway.get_attribute(&resource, &attribute).await?;
    Ok(Json(value))
}

pub async fn set_attribute(
    State(state): State<RestState>,
    headers: HeaderMap,
    Path((resource, attribute)): Path<(String, String)>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> ApiResult<Json<JsonValue>> {
    authorize(&state, &headers, Access::Write, Some(&resource))?;
    let Json(body) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let written = state
        .gateway
        .set_attribute(&resource, &attribute, &body)
        .await?;
    Ok(Json(json!({ "written": written })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListenParams {
    pub category: Option<String>,
    pub filter: Option<String>,
}

/// Server-sent events, one `notification` event per delivery. The
/// subscription is released when the client disconnects.
pub async fn listen(
    State(state): State<RestState>,
    headers: HeaderMap,
    Path(resource): Path<String>,
    Query(params): Query<ListenParams>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    authorize(&state, &headers, Access::Listen, Some(&resource))?;
    let stream = state
        .gateway
        .listen(
            &resource,
            params.category.as_deref(),
            params.filter.as_deref(),
        )
        .await?;
    info!(
        resource = %resource,
        subscriptions = stream.handles().len(),
        "[REST] Notification stream opened"
    );

    let events = stream.map(|notification| {
        let mut event = Event::default().event("notification");
        if let Some(sequence) = notification.get("sequenceNumber").and_then(JsonValue::as_u64) {
            event = event.id(sequence.to_string());
        }
        Ok(event.data(notification.to_string()))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
