//! Reconnect, listener replay and health checking against a fake remote server

use std::sync::Arc;
use std::time::Duration;

use mxagent_core::{
    Agent, AgentBuilder, AgentConfig, AgentError, ConnectionManager, ConnectionState, Connector,
    Options, RetryPolicy, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tests::async_helpers::{eventually, DEFAULT_TIMEOUT};
use tests::events::collect_events;
use tests::mocks::{FakeFactory, RecordingListener, RemoteManager};
use tests::{AgentEvent, FakeServer, RemoteConnector};

struct Remote {
    agent: Arc<Agent>,
    server: Arc<FakeServer>,
    connector: Arc<RemoteConnector>,
}

impl Remote {
    fn manager(&self) -> &Arc<RemoteManager> {
        self.connector.manager()
    }
}

async fn remote(policy: RetryPolicy) -> Remote {
    let agent = Arc::new(Agent::builder().build());
    let server = FakeServer::new().with_value("load", 0.5);
    let manager = Arc::new(
        ConnectionManager::new(FakeFactory::new(server.clone()), policy)
            .with_event_sender(agent.event_bus().sender()),
    );
    let connector = RemoteConnector::new(server.clone(), manager);
    agent
        .attach(
            "remote",
            Connector::new()
                .with_attributes(connector.clone())
                .with_notifications(connector.clone()),
        )
        .await
        .unwrap();
    Remote {
        agent,
        server,
        connector,
    }
}

fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(attempts)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
}

async fn enable_and_subscribe(remote: &Remote, category: &str) -> Arc<RecordingListener> {
    let notifications = remote.agent.notifications();
    notifications
        .enable("remote", category, category, Options::new())
        .await
        .unwrap()
        .unwrap();
    let listener = RecordingListener::new();
    notifications
        .subscribe("remote", category, listener.clone(), None)
        .await
        .unwrap();
    listener
}

#[tokio::test]
async fn abort_and_reconnect_replays_every_subscription() {
    let remote = remote(RetryPolicy::default()).await;
    remote.manager().connect().await.unwrap();

    let cpu = enable_and_subscribe(&remote, "cpu.high").await;
    let disk = enable_and_subscribe(&remote, "disk.full").await;
    assert_eq!(remote.manager().bindings().await.len(), 2);

    assert!(remote.connector.push("cpu.high", "before").await.is_some());
    assert!(remote.connector.push("disk.full", "before").await.is_some());

    remote.manager().simulate_connection_abort().await;
    assert_eq!(remote.manager().state(), ConnectionState::Disconnected);
    assert!(remote.connector.push("cpu.high", "lost").await.is_none());
    assert!(remote.connector.push("disk.full", "lost").await.is_none());

    remote.manager().connect().await.unwrap();
    assert_eq!(remote.manager().state(), ConnectionState::Connected);
    assert_eq!(remote.server.registrations("cpu.high"), 1);
    assert_eq!(remote.server.registrations("disk.full"), 1);

    remote.connector.push("cpu.high", "after").await.unwrap();
    remote.connector.push("disk.full", "after").await.unwrap();
    assert_eq!(cpu.messages(), vec!["before".to_string(), "after".to_string()]);
    assert_eq!(disk.messages(), vec!["before".to_string(), "after".to_string()]);
}

#[tokio::test]
async fn bindings_made_while_disconnected_apply_on_connect() {
    let remote = remote(RetryPolicy::default()).await;
    let listener = enable_and_subscribe(&remote, "cpu.high").await;

    assert!(!remote.server.is_listening("cpu.high"));
    remote.manager().connect().await.unwrap();
    assert!(remote.server.is_listening("cpu.high"));

    let report = remote.connector.push("cpu.high", "late").await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(listener.count(), 1);
}

#[tokio::test]
async fn health_check_restores_listeners_after_server_drop() {
    let remote = remote(fast_retry(3)).await;
    remote.manager().connect().await.unwrap();
    enable_and_subscribe(&remote, "cpu.high").await;
    enable_and_subscribe(&remote, "disk.full").await;

    remote.server.kill_connections();
    assert!(!remote.server.is_listening("cpu.high"));

    remote.manager().start_health_check(Duration::from_millis(20));
    let server = remote.server.clone();
    assert!(
        eventually(DEFAULT_TIMEOUT, move || {
            server.is_listening("cpu.high") && server.is_listening("disk.full")
        })
        .await
    );
    assert_eq!(remote.server.connects(), 2);
    remote.manager().stop_health_check();
}

#[tokio::test]
async fn read_on_dead_connection_fails_once_then_reconnects() {
    let remote = remote(RetryPolicy::default()).await;
    let attributes = remote.agent.attributes();
    attributes
        .bind("remote", "load", "load", Options::new())
        .await
        .unwrap()
        .unwrap();

    let value = attributes
        .try_read("remote", "load", DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(value.value(), &Value::Float64(0.5));

    remote.server.kill_connections();
    let err = attributes
        .try_read("remote", "load", DEFAULT_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ConnectionLost(_)));
    assert_eq!(remote.manager().state(), ConnectionState::Degraded);

    let value = attributes
        .try_read("remote", "load", DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(value.value(), &Value::Float64(0.5));
    assert_eq!(remote.server.connects(), 2);
}

#[tokio::test]
async fn exhausted_retries_fail_without_losing_bindings() {
    let remote = remote(fast_retry(2)).await;
    enable_and_subscribe(&remote, "cpu.high").await;

    remote.server.refuse_next(10);
    let err = remote.manager().connect().await.unwrap_err();
    assert!(matches!(err, AgentError::ConnectionUnavailable(_)));
    assert_eq!(remote.manager().state(), ConnectionState::Failed);
    assert_eq!(remote.manager().bindings().await.len(), 1);

    remote.server.refuse_next(0);
    remote.manager().connect().await.unwrap();
    assert_eq!(remote.manager().state(), ConnectionState::Connected);
    assert!(remote.server.is_listening("cpu.high"));
}

#[tokio::test]
async fn state_changes_and_replays_reach_the_event_bus() {
    let remote = remote(RetryPolicy::default()).await;
    let mut events = remote.agent.event_bus().subscribe();
    enable_and_subscribe(&remote, "cpu.high").await;

    remote.manager().connect().await.unwrap();
    remote.manager().simulate_connection_abort().await;
    remote.manager().connect().await.unwrap();

    let events = collect_events(&mut events, Duration::from_millis(100)).await;
    let transitions: Vec<(ConnectionState, ConnectionState)> = events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ConnectionStateChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (ConnectionState::Disconnected, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Connected),
            (ConnectionState::Connected, ConnectionState::Disconnected),
            (ConnectionState::Disconnected, ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionState::Connected),
        ]
    );

    let replays = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                AgentEvent::ListenersReplayed { endpoint, count: 1 } if endpoint == "fake://remote"
            )
        })
        .count();
    assert_eq!(replays, 2);
}

#[tokio::test]
async fn agent_config_drives_retry_policy_and_health_check() {
    let config: AgentConfig = serde_json::from_value(json!({
        "connection": {
            "max_attempts": 2,
            "initial_backoff_ms": 1,
            "max_backoff_ms": 5,
            "operation_timeout_ms": 750,
            "health_check_interval_ms": 20
        }
    }))
    .unwrap();
    let agent = Arc::new(AgentBuilder::from_config(&config).unwrap().build());
    let server = FakeServer::new().with_value("load", 0.5);
    let connector = RemoteConnector::for_agent(server.clone(), &agent);
    agent
        .attach(
            "remote",
            Connector::new()
                .with_attributes(connector.clone())
                .with_notifications(connector.clone()),
        )
        .await
        .unwrap();

    let manager = connector.manager();
    assert_eq!(manager.policy().max_attempts, 2);
    assert_eq!(
        agent.connection_settings().operation_timeout,
        Duration::from_millis(750)
    );

    agent
        .notifications()
        .enable("remote", "cpu.high", "cpu.high", Options::new())
        .await
        .unwrap()
        .unwrap();

    // No caller traffic: the configured health check connects and replays
    let watched = server.clone();
    assert!(eventually(DEFAULT_TIMEOUT, move || watched.is_listening("cpu.high")).await);

    server.kill_connections();
    let watched = server.clone();
    assert!(eventually(DEFAULT_TIMEOUT, move || watched.is_listening("cpu.high")).await);
    assert_eq!(server.connects(), 2);

    server.refuse_next(100);
    manager.simulate_connection_abort().await;
    let err = manager.connect().await.unwrap_err();
    assert!(matches!(err, AgentError::ConnectionUnavailable(_)));
    manager.close().await;
}
