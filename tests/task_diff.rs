//! Task Definition Registration Integration Tests
//!
//! Covers revision listing, latest-revision selection, and the diff-aware
//! registration that skips a new revision when the desired definition
//! already matches the stored one.

mod common;

use common::FakeAws;
use gantry::aws::types::{ContainerDefinition, PortMapping, TaskDefinition};
use gantry::deploy::TaskDefinitionStore;

fn definition(family: &str, image: &str) -> TaskDefinition {
    TaskDefinition {
        family: family.to_string(),
        revision: None,
        task_definition_arn: None,
        container_definitions: vec![ContainerDefinition {
            name: family.to_string(),
            image: image.to_string(),
            port_mappings: vec![PortMapping {
                container_port: 8080,
                host_port: Some(8080),
                protocol: Some("tcp".to_string()),
            }],
            essential: Some(true),
            environment: Vec::new(),
        }],
        cpu: Some("256".to_string()),
        memory: Some("512".to_string()),
        network_mode: Some("awsvpc".to_string()),
        requires_compatibilities: vec!["FARGATE".to_string()],
        execution_role_arn: None,
    }
}

#[tokio::test]
async fn test_first_register_creates_revision_one() {
    let aws = FakeAws::new();
    let store = TaskDefinitionStore::new(&aws);

    let outcome = store
        .register_if_different(&definition("my-svc", "repo/my-svc:v1"))
        .await
        .unwrap();

    assert!(outcome.is_registered());
    assert_eq!(outcome.definition().revision, Some(1));
    assert_eq!(outcome.definition().reference().as_deref(), Some("my-svc:1"));
    assert_eq!(aws.calls("register-task-definition"), 1);
}

#[tokio::test]
async fn test_identical_definition_is_not_reregistered() {
    let aws = FakeAws::new();
    let store = TaskDefinitionStore::new(&aws);
    let desired = definition("my-svc", "repo/my-svc:v1");

    store.register_if_different(&desired).await.unwrap();
    let second = store.register_if_different(&desired).await.unwrap();

    assert!(!second.is_registered());
    assert_eq!(second.definition().revision, Some(1));
    assert_eq!(aws.calls("register-task-definition"), 1);
}

#[tokio::test]
async fn test_changed_image_registers_next_revision() {
    let aws = FakeAws::new();
    let store = TaskDefinitionStore::new(&aws);

    store
        .register_if_different(&definition("my-svc", "repo/my-svc:v1"))
        .await
        .unwrap();
    let outcome = store
        .register_if_different(&definition("my-svc", "repo/my-svc:v2"))
        .await
        .unwrap();

    assert!(outcome.is_registered());
    assert_eq!(outcome.definition().revision, Some(2));
    assert_eq!(aws.calls("register-task-definition"), 2);
}

#[tokio::test]
async fn test_removed_field_does_not_register() {
    let aws = FakeAws::new();
    let store = TaskDefinitionStore::new(&aws);

    store
        .register_if_different(&definition("my-svc", "repo/my-svc:v1"))
        .await
        .unwrap();

    // Comparison is one-directional: dropping a field from the desired
    // definition leaves it a subset of the stored revision.
    let mut trimmed = definition("my-svc", "repo/my-svc:v1");
    trimmed.memory = None;
    let outcome = store.register_if_different(&trimmed).await.unwrap();

    assert!(!outcome.is_registered());
    assert_eq!(aws.calls("register-task-definition"), 1);
}

#[tokio::test]
async fn test_revisions_exclude_prefixed_families() {
    let aws = FakeAws::new();
    let mut api = definition("api", "repo/api:v1");
    api.revision = Some(1);
    aws.seed_task_definition(api);
    let mut worker = definition("api-worker", "repo/api-worker:v1");
    worker.revision = Some(1);
    aws.seed_task_definition(worker);

    let store = TaskDefinitionStore::new(&aws);
    let arns = store.list_active_revisions("api").await.unwrap();

    assert_eq!(arns.len(), 1);
    assert!(arns[0].contains("task-definition/api:1"));
}

#[tokio::test]
async fn test_unknown_family_lists_empty_without_listing_revisions() {
    let aws = FakeAws::new();
    let store = TaskDefinitionStore::new(&aws);

    let arns = store.list_active_revisions("ghost").await.unwrap();

    assert!(arns.is_empty());
    // The families gate short-circuits before any revision listing.
    assert_eq!(aws.calls("list-task-definitions"), 0);
}

#[tokio::test]
async fn test_latest_revision_picks_highest_number() {
    let aws = FakeAws::new();
    for revision in [1, 3, 2] {
        let mut seeded = definition("my-svc", &format!("repo/my-svc:v{revision}"));
        seeded.revision = Some(revision);
        aws.seed_task_definition(seeded);
    }

    let store = TaskDefinitionStore::new(&aws);
    let latest = store.latest_revision("my-svc").await.unwrap().unwrap();

    assert_eq!(latest.revision, Some(3));
    assert_eq!(latest.container_definitions[0].image, "repo/my-svc:v3");
}

#[tokio::test]
async fn test_latest_revision_of_unknown_family_is_none() {
    let aws = FakeAws::new();
    let store = TaskDefinitionStore::new(&aws);

    assert!(store.latest_revision("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_fetch_accepts_full_arn() {
    let aws = FakeAws::new();
    let mut seeded = definition("my-svc", "repo/my-svc:v1");
    seeded.revision = Some(4);
    aws.seed_task_definition(seeded);

    let store = TaskDefinitionStore::new(&aws);
    let fetched = store
        .fetch("arn:aws:ecs:us-east-1:123456789012:task-definition/my-svc:4")
        .await
        .unwrap();

    assert_eq!(fetched.family, "my-svc");
    assert_eq!(fetched.revision, Some(4));
}
