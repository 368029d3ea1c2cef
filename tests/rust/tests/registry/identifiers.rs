//! Composite identifier rules as seen by the registries

use std::collections::HashSet;
use std::sync::Arc;

use mxagent_core::{Agent, AgentError, Connector, IdScheme, Options};
use tests::mocks::FlakySource;

#[test]
fn distinct_pairs_never_collide() {
    let resources = ["a", "ab", "host1", "host-1", "h"];
    let names = ["b", "cpu", "b::c", "::", "x::y::z", "ab:"];

    for scheme in [IdScheme::double_colon(), IdScheme::slash()] {
        let mut keys = HashSet::new();
        for resource in resources {
            for name in names {
                let id = scheme.compose(resource, name).unwrap();
                let parsed = scheme.parse(id.as_str()).unwrap();
                assert_eq!(parsed.resource(), resource);
                assert_eq!(parsed.name(), name);
                assert!(keys.insert(id.into_key()), "{resource} / {name} collided");
            }
        }
    }
}

#[test]
fn ambiguous_resource_names_are_rejected() {
    let scheme = IdScheme::double_colon();
    // ("a", "b::c") and ("a::b", "c") would share a key
    assert!(scheme.compose("a", "b::c").is_ok());
    assert!(matches!(
        scheme.compose("a::b", "c"),
        Err(AgentError::InvalidIdentifier(_))
    ));
    assert!(scheme.validate_resource("host:").is_err());
    assert!(scheme.validate_resource("").is_err());
}

#[tokio::test]
async fn agent_refuses_resources_that_overlap_the_separator() {
    let agent = Arc::new(Agent::builder().build());
    let err = agent
        .attach(
            "rack::host1",
            Connector::new().with_attributes(FlakySource::new(0, 1.0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::InvalidIdentifier(_)));
    assert!(agent.resources().is_empty());
}

#[tokio::test]
async fn local_names_may_contain_the_separator() {
    let agent = Arc::new(Agent::builder().with_scheme(IdScheme::slash()).build());
    agent
        .attach(
            "host1",
            Connector::new().with_attributes(FlakySource::new(0, 1.0)),
        )
        .await
        .unwrap();
    let attributes = agent.attributes();
    attributes
        .bind("host1", "disk/sda/load", "load", Options::new())
        .await
        .unwrap()
        .unwrap();

    let descriptor = attributes.descriptor("host1", "disk/sda/load").unwrap();
    assert_eq!(descriptor.connector_name, "load");
    assert_eq!(attributes.list_resources().len(), 1);
}
