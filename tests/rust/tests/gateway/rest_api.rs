//! REST status mapping over a mixed set of resources

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mxagent_core::{Agent, ConnectionManager, Connector, Options, RetryPolicy};
use mxagent_gateway::{rest, JsonCodec, ResourceGateway, RestState};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use tests::fixtures::{self, SHORT_TIMEOUT};
use tests::mocks::FakeFactory;
use tests::{FakeServer, RemoteConnector};

/// host1 and slow from the fixtures, plus a remote resource whose server
/// refuses every connection.
async fn app() -> Router {
    let agent = Arc::new(
        Agent::builder()
            .with_timeouts(SHORT_TIMEOUT, SHORT_TIMEOUT)
            .build(),
    );
    agent.attach_memory(&fixtures::host1()).await.unwrap();
    agent.attach_memory(&fixtures::slow()).await.unwrap();

    let server = FakeServer::new().with_value("load", 0.5);
    server.refuse_next(usize::MAX);
    let manager = Arc::new(ConnectionManager::new(
        FakeFactory::new(server.clone()),
        RetryPolicy::no_retry(),
    ));
    let remote = RemoteConnector::new(server, manager);
    agent
        .attach(
            "remote",
            Connector::new()
                .with_attributes(remote.clone())
                .with_notifications(remote),
        )
        .await
        .unwrap();
    agent
        .attributes()
        .bind("remote", "load", "load", Options::new())
        .await
        .unwrap()
        .unwrap();

    rest::router(RestState::new(ResourceGateway::new(agent, JsonCodec::default())))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn statuses_follow_the_error_kind() {
    let app = app().await;

    let (status, body) = send(&app, get("/host1/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));

    let (status, body) = send(&app, post("/host1/cpuLoad", json!("hot"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());

    let (status, body) = send(&app, post("/host1/uptime", json!(1))).await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["error"], json!("unsupported"));

    let (status, body) = send(&app, get("/remote/load")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], json!("connection_unavailable"));
}

#[tokio::test]
async fn timeouts_render_defaults_not_errors() {
    let app = app().await;

    let (status, body) = send(&app, get("/slow/queueDepth")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(0));

    let (status, body) = send(&app, post("/slow/queueDepth", json!(3))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "written": false }));
}

#[tokio::test]
async fn directory_lists_every_resource() {
    let app = app().await;

    let (status, body) = send(&app, get("/attributes")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<String> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|d| format!("{}/{}", d["resource"].as_str().unwrap(), d["name"].as_str().unwrap()))
        .collect();
    assert!(names.contains(&"host1/cpuLoad".to_string()));
    assert!(names.contains(&"slow/queueDepth".to_string()));
    assert!(names.contains(&"remote/load".to_string()));

    let (status, body) = send(&app, get("/notifications?resource=host1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["category"], json!("cpu.high"));
}

#[tokio::test]
async fn string_attributes_round_trip_as_json_strings() {
    let app = app().await;

    let (status, body) = send(&app, get("/host1/hostname")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("web-01"));

    let (status, _) = send(&app, post("/host1/hostname", json!("web-02"))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app, get("/host1/hostname")).await;
    assert_eq!(body, json!("web-02"));
}
