//! Bind / rebind / read / write through the agent

use std::sync::Arc;
use std::time::Duration;

use mxagent_core::{
    Agent, AgentError, AttributeValue, Connector, MaxFeatures, Options, Value,
};
use pretty_assertions::assert_eq;
use mxagent_core::connector::memory::ATTRIBUTE_CHANGE;
use tests::async_helpers::{eventually, with_timeout, DEFAULT_TIMEOUT};
use tests::fixtures::{self, SHORT_TIMEOUT};
use tests::mocks::{FlakySource, GatedSource, RecordingListener, SlowListener};

async fn agent_with(resource: &str, connector: Connector) -> Arc<Agent> {
    let agent = Arc::new(Agent::builder().build());
    agent.attach(resource, connector).await.unwrap();
    agent
}

#[tokio::test]
async fn rebinding_keeps_one_entry_and_drains_readers_first() {
    let source = GatedSource::new(false);
    let agent = agent_with("host1", Connector::new().with_attributes(source.clone())).await;
    let attributes = agent.attributes().clone();

    attributes
        .bind("host1", "threads", "threads", Options::new())
        .await
        .unwrap()
        .unwrap();

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let attributes = attributes.clone();
            tokio::spawn(async move {
                attributes
                    .try_read("host1", "threads", DEFAULT_TIMEOUT)
                    .await
            })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let rebind = {
        let attributes = attributes.clone();
        tokio::spawn(async move {
            attributes
                .bind("host1", "threads", "threads", Options::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Old accessor stays alive while its reads are in flight
    assert_eq!(source.released(), 0);
    assert!(!rebind.is_finished());

    source.open(8);
    for reader in readers {
        let value = with_timeout(DEFAULT_TIMEOUT, reader).await.unwrap().unwrap();
        assert_eq!(value.value(), &Value::Int64(1));
    }
    with_timeout(DEFAULT_TIMEOUT, rebind)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(source.released(), 1);
    assert_eq!(source.connects(), 2);
    assert_eq!(attributes.descriptors("host1").len(), 1);

    source.open(1);
    let value = attributes
        .try_read("host1", "threads", DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(value.value(), &Value::Int64(2));
}

#[tokio::test]
async fn unsupported_attribute_leaves_registry_untouched() {
    let agent = agent_with(
        "host1",
        Connector::new().with_attributes(FlakySource::new(0, 1.5)),
    )
    .await;
    let attributes = agent.attributes();

    let bound = attributes
        .bind("host1", "load", "unsupported_load", Options::new())
        .await
        .unwrap();
    assert!(bound.is_none());
    assert!(attributes.is_empty());
}

#[tokio::test]
async fn read_falls_back_to_default_on_connector_failure() {
    let agent = agent_with(
        "host1",
        Connector::new().with_attributes(FlakySource::new(1, 0.25)),
    )
    .await;
    let attributes = agent.attributes();
    attributes
        .bind("host1", "load", "load", Options::new())
        .await
        .unwrap();

    let fallback = AttributeValue::scalar(-1.0f64).unwrap();
    let first = attributes
        .read("host1", "load", DEFAULT_TIMEOUT, fallback.clone())
        .await;
    assert_eq!(first, fallback);

    let second = attributes
        .read("host1", "load", DEFAULT_TIMEOUT, fallback)
        .await;
    assert_eq!(second.value(), &Value::Float64(0.25));
}

#[tokio::test]
async fn slow_read_times_out_and_yields_default() {
    let agent = fixtures::agent().await;
    let attributes = agent.attributes();

    let err = attributes
        .try_read("slow", "queueDepth", SHORT_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Timeout(t) if t == SHORT_TIMEOUT));

    let fallback = AttributeValue::scalar(7i32).unwrap();
    let value = attributes
        .read("slow", "queueDepth", SHORT_TIMEOUT, fallback.clone())
        .await;
    assert_eq!(value, fallback);

    assert!(
        !attributes
            .write(
                "slow",
                "queueDepth",
                AttributeValue::scalar(1i32).unwrap(),
                SHORT_TIMEOUT
            )
            .await
    );
}

#[tokio::test]
async fn writes_convert_to_the_declared_type() {
    let agent = fixtures::agent().await;
    let attributes = agent.attributes();

    attributes
        .try_write(
            "host1",
            "cpuLoad",
            AttributeValue::scalar(3i32).unwrap(),
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap();
    let value = attributes
        .try_read("host1", "cpuLoad", DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(value.value(), &Value::Float64(3.0));

    let err = attributes
        .try_write(
            "host1",
            "cpuLoad",
            AttributeValue::scalar("hot").unwrap(),
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AgentError::InvalidValue(_) | AgentError::SchemaMismatch(_) | AgentError::Unsupported(_)
    ));

    let err = attributes
        .try_write(
            "host1",
            "uptime",
            AttributeValue::scalar(1i64).unwrap(),
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Unsupported(_)));
}

#[tokio::test]
async fn license_limits_new_bindings_only() {
    let agent = Arc::new(
        Agent::builder()
            .with_license(Arc::new(MaxFeatures::attributes(1)))
            .build(),
    );
    agent
        .attach(
            "host1",
            Connector::new().with_attributes(FlakySource::new(0, 1.0)),
        )
        .await
        .unwrap();
    let attributes = agent.attributes();

    attributes
        .bind("host1", "a", "a", Options::new())
        .await
        .unwrap();
    let err = attributes
        .bind("host1", "b", "b", Options::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::LicenseDenied(_)));

    // Rebinding an existing identifier is not a new feature
    assert!(attributes
        .bind("host1", "a", "a", Options::new())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn detach_releases_every_binding() {
    let agent = fixtures::agent().await;
    assert_eq!(agent.attributes().list_attributes("host1").len(), 3);

    assert!(agent.detach("host1").await);
    assert!(agent.attributes().list_attributes("host1").is_empty());
    assert!(agent.notifications().list_notifications("host1").is_empty());
    assert!(matches!(
        agent
            .attributes()
            .try_read("host1", "cpuLoad", DEFAULT_TIMEOUT)
            .await,
        Err(AgentError::NotFound(_))
    ));
    assert!(!agent.detach("host1").await);
}

#[tokio::test]
async fn slow_change_listener_does_not_fail_the_write() {
    let agent = fixtures::agent().await;
    agent
        .notifications()
        .enable("host1", "change", ATTRIBUTE_CHANGE, Options::new())
        .await
        .unwrap()
        .unwrap();
    let listener = SlowListener::new(Duration::from_millis(300));
    agent
        .notifications()
        .subscribe("host1", "change", listener.clone(), None)
        .await
        .unwrap();

    let written = agent
        .attributes()
        .write(
            "host1",
            "hostname",
            AttributeValue::scalar("db-02").unwrap(),
            SHORT_TIMEOUT,
        )
        .await;
    assert!(written);

    let value = agent
        .attributes()
        .try_read("host1", "hostname", DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(value.value(), &Value::String("db-02".to_string()));
    assert!(eventually(Duration::from_secs(2), || listener.count() == 1).await);
}

#[tokio::test]
async fn write_raises_one_change_notification() {
    let agent = fixtures::agent().await;
    agent
        .notifications()
        .enable("host1", "change", ATTRIBUTE_CHANGE, Options::new())
        .await
        .unwrap()
        .unwrap();
    let listener = RecordingListener::new();
    agent
        .notifications()
        .subscribe("host1", "change", listener.clone(), None)
        .await
        .unwrap();

    assert!(
        agent
            .attributes()
            .write(
                "host1",
                "cpuLoad",
                AttributeValue::scalar(0.9f64).unwrap(),
                DEFAULT_TIMEOUT
            )
            .await
    );

    assert!(eventually(Duration::from_secs(1), || listener.count() == 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let received = listener.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].category, ATTRIBUTE_CHANGE);
    assert_eq!(received[0].source, "host1");
    assert_eq!(received[0].message, "cpuLoad changed");
}
