//! Delivery through the agent's notification registry

use std::sync::Arc;
use std::time::Duration;

use mxagent_core::connector::memory::MemoryResourceConfig;
use mxagent_core::{
    Agent, AgentEvent, AttributeValue, ListenerInvoker, NotificationFilter, Options, Severity,
    SharedListener, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tests::async_helpers::eventually;
use tests::events::wait_for_event;
use tests::fixtures;
use tests::mocks::{FailingListener, RecordingListener};

#[tokio::test]
async fn failing_listener_does_not_affect_the_others() {
    let agent = Arc::new(Agent::builder().build());
    let connector = agent.attach_memory(&fixtures::host1()).await.unwrap();
    let notifications = agent.notifications();

    let healthy: Vec<Arc<RecordingListener>> = (0..4).map(|_| RecordingListener::new()).collect();
    let failing = FailingListener::erroring();
    for listener in &healthy {
        notifications
            .subscribe("host1", "cpu.high", listener.clone(), None)
            .await
            .unwrap();
    }
    notifications
        .subscribe("host1", "cpu.high", failing.clone(), None)
        .await
        .unwrap();

    let report = connector.raise("cpu.high", "load 97%").await.unwrap();
    assert_eq!(report.delivered, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(failing.calls(), 1);
    for listener in &healthy {
        assert_eq!(listener.messages(), vec!["load 97%".to_string()]);
    }
}

#[tokio::test]
async fn panicking_listener_is_isolated_and_reported() {
    let agent = Arc::new(Agent::builder().build());
    let mut events = agent.event_bus().subscribe();
    let connector = agent.attach_memory(&fixtures::host1()).await.unwrap();
    let notifications = agent.notifications();

    let healthy = RecordingListener::new();
    notifications
        .subscribe("host1", "cpu.high", FailingListener::panicking(), None)
        .await
        .unwrap();
    notifications
        .subscribe("host1", "cpu.high", healthy.clone(), None)
        .await
        .unwrap();

    let report = connector.raise("cpu.high", "load 99%").await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(healthy.count(), 1);

    let failure = wait_for_event(&mut events, Duration::from_secs(1), |e| {
        matches!(e, AgentEvent::ListenerFailed { .. })
    })
    .await;
    assert!(matches!(
        failure,
        Some(AgentEvent::ListenerFailed { category, .. }) if category == "cpu.high"
    ));
}

#[tokio::test]
async fn sequential_delivery_preserves_subscription_order() {
    let agent = Arc::new(
        Agent::builder()
            .with_invoker(ListenerInvoker::sequential())
            .build(),
    );
    let connector = agent.attach_memory(&fixtures::host1()).await.unwrap();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    for id in 0..3 {
        let order = order.clone();
        let listener: SharedListener = mxagent_core::notifications::listener_fn(move |_| {
            order.lock().push(id);
            Ok(())
        });
        agent
            .notifications()
            .subscribe("host1", "cpu.high", listener, None)
            .await
            .unwrap();
    }

    connector.raise("cpu.high", "first").await.unwrap();
    connector.raise("cpu.high", "second").await.unwrap();
    assert_eq!(*order.lock(), vec![0, 1, 2, 0, 1, 2]);
}

#[tokio::test]
async fn one_listener_on_two_names_of_a_category_receives_once() {
    let agent = Arc::new(Agent::builder().build());
    let connector = agent.attach_memory(&fixtures::host1()).await.unwrap();
    let notifications = agent.notifications();
    notifications
        .enable("host1", "cpuAlarm", "cpu.high", Options::new())
        .await
        .unwrap()
        .unwrap();

    let listener = RecordingListener::new();
    let handles = notifications
        .subscribe_resource("host1", Some("cpu.high"), listener.clone(), None)
        .await
        .unwrap();
    assert_eq!(handles.len(), 2);

    connector.raise("cpu.high", "once").await.unwrap();
    assert_eq!(listener.count(), 1);

    for handle in &handles {
        assert!(notifications.unsubscribe(handle));
    }
    connector.raise("cpu.high", "gone").await.unwrap();
    assert_eq!(listener.count(), 1);
}

#[tokio::test]
async fn notifications_are_stamped_and_filtered_per_subscription() {
    let agent = Arc::new(Agent::builder().build());
    let connector = agent.attach_memory(&fixtures::host1()).await.unwrap();
    let notifications = agent.notifications();

    let everything = RecordingListener::new();
    let critical_only = RecordingListener::new();
    notifications
        .subscribe("host1", "cpu.high", everything.clone(), None)
        .await
        .unwrap();
    notifications
        .subscribe(
            "host1",
            "cpu.high",
            critical_only.clone(),
            Some(NotificationFilter::parse("severity>=critical").unwrap()),
        )
        .await
        .unwrap();

    connector.raise("cpu.high", "warm").await.unwrap();
    connector.raise("cpu.high", "hot").await.unwrap();

    let received = everything.received();
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|n| n.source == "host1"));
    assert!(received.iter().all(|n| n.severity == Severity::Warning));
    assert!(received[0].sequence_number > 0);
    assert!(received[1].sequence_number > received[0].sequence_number);
    assert_eq!(critical_only.count(), 0);
}

#[tokio::test]
async fn attachments_are_coerced_to_the_declared_type() {
    let agent = Arc::new(Agent::builder().build());
    let config: MemoryResourceConfig = serde_json::from_value(json!({
        "name": "disk1",
        "notifications": [
            { "category": "disk.full", "severity": "error", "attachment": { "kind": "float64" } }
        ]
    }))
    .unwrap();
    let connector = agent.attach_memory(&config).await.unwrap();
    let listener = RecordingListener::new();
    agent
        .notifications()
        .subscribe("disk1", "disk.full", listener.clone(), None)
        .await
        .unwrap();

    connector
        .raise_with("disk.full", "95% used", Some(AttributeValue::scalar(95i32).unwrap()))
        .await
        .unwrap();

    let received = listener.received();
    let attachment = received[0].attachment.as_ref().unwrap();
    assert_eq!(attachment.value(), &Value::Float64(95.0));
}

#[tokio::test]
async fn detached_delivery_returns_before_listeners_run() {
    let agent = Arc::new(Agent::builder().with_detached_delivery(true).build());
    let connector = agent.attach_memory(&fixtures::host1()).await.unwrap();
    let listener = RecordingListener::new();
    agent
        .notifications()
        .subscribe("host1", "cpu.high", listener.clone(), None)
        .await
        .unwrap();

    let report = connector.raise("cpu.high", "async").await.unwrap();
    assert_eq!(report.delivered, 0);
    assert!(eventually(Duration::from_secs(1), || listener.count() == 1).await);
}

#[tokio::test]
async fn disabled_category_stops_delivery() {
    let agent = Arc::new(Agent::builder().build());
    let connector = agent.attach_memory(&fixtures::host1()).await.unwrap();
    let listener = RecordingListener::new();
    agent
        .notifications()
        .subscribe("host1", "cpu.high", listener.clone(), None)
        .await
        .unwrap();

    assert!(agent.notifications().disable("host1", "cpu.high").await.unwrap());
    assert!(connector.raise("cpu.high", "ignored").await.is_none());
    assert_eq!(listener.count(), 0);
}
