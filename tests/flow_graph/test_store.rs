#[path = "../common/mod.rs"]
mod common;

use chatflow::core::error::AppError;
use chatflow::core::flow_graph::{
    FileGraphStore, Flow, FlowEngine, GraphStore, InMemoryGraphStore, Node, ReachabilityPolicy,
    RunOutcome, StoreError, ValidationError, VarValue,
};
use common::{age_branch_flow, target, vars, RecordingChannel};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn draft_without_end(id: &str) -> Flow {
    let mut flow = Flow::new(id, "owner-1", "Draft");
    flow.add_node(Node::start("start"))
        .add_node(Node::message("hello", "Hello"));
    flow.connect("start", "hello");
    flow
}

#[tokio::test]
async fn drafts_can_be_incomplete_but_publish_validates() {
    let store = InMemoryGraphStore::new();
    let saved = store.save_draft(draft_without_end("wip"));
    assert!(!saved.published);

    let err = store.publish("wip", ReachabilityPolicy::All).unwrap_err();
    assert_eq!(err, StoreError::Validation(ValidationError::MissingEndNode));
    assert_eq!(err.code(), "FLOW-VALID-003");

    let loaded = store.load_flow("wip").await.unwrap();
    assert!(!loaded.published);
}

#[tokio::test]
async fn publish_and_unpublish_toggle_state() {
    let store = InMemoryGraphStore::new();
    store.save_draft(age_branch_flow());

    let published = store.publish("age-check", ReachabilityPolicy::All).unwrap();
    assert!(published.published);
    assert!(store.load_flow("age-check").await.unwrap().published);

    let draft = store.unpublish("age-check").unwrap();
    assert!(!draft.published);
    assert!(published.updated_at <= draft.updated_at);
}

#[test]
fn lifecycle_calls_on_unknown_flows_report_not_found() {
    let store = InMemoryGraphStore::new();
    assert_eq!(
        store.publish("ghost", ReachabilityPolicy::Any).unwrap_err(),
        StoreError::NotFound("ghost".to_string())
    );
    assert!(store.unpublish("ghost").is_err());
    assert!(!store.delete("ghost"));
}

#[tokio::test]
async fn delete_removes_the_whole_graph() {
    let store = InMemoryGraphStore::new();
    store.save_draft(age_branch_flow());

    assert!(store.delete("age-check"));
    assert!(matches!(
        store.load_flow("age-check").await,
        Err(StoreError::NotFound(_))
    ));
    assert!(store.list().is_empty());
}

#[test]
fn list_is_sorted_by_name_then_id() {
    let store = InMemoryGraphStore::new();
    store.save_draft(Flow::new("b", "owner-1", "Onboarding"));
    store.save_draft(Flow::new("a", "owner-1", "Onboarding"));
    store.save_draft(age_branch_flow());

    let ids: Vec<String> = store.list().into_iter().map(|summary| summary.id).collect();
    assert_eq!(ids, vec!["age-check", "a", "b"]);

    let summary = store
        .list()
        .into_iter()
        .find(|summary| summary.id == "age-check")
        .unwrap();
    assert_eq!(summary.node_count, 6);
    assert_eq!(summary.connection_count, 5);
}

#[test]
fn store_errors_map_to_app_error_codes() {
    let app: AppError = StoreError::Unavailable("disk full".to_string()).into();
    assert_eq!(app.code, "STORE-002");
    assert!(app.to_string().contains("disk full"));

    let missing: AppError = StoreError::NotFound("welcome".to_string()).into();
    assert_eq!(missing.code, "STORE-001");
    assert_eq!(missing.context.get("flow_id").map(String::as_str), Some("welcome"));
}

#[tokio::test]
async fn file_store_round_trips_yaml() {
    let dir = TempDir::new().unwrap();
    let store = FileGraphStore::new(dir.path().join("flows"));

    let path = store.save(&age_branch_flow()).await.unwrap();
    assert!(path.ends_with("flows/age-check.yaml"));

    let loaded = store.load_flow("age-check").await.unwrap();
    assert_eq!(loaded.nodes, age_branch_flow().nodes);
    assert_eq!(loaded.connections, age_branch_flow().connections);
    assert_eq!(loaded.content_hash(), age_branch_flow().content_hash());
}

#[tokio::test]
async fn file_store_reads_json_documents() {
    let dir = TempDir::new().unwrap();
    let document = r#"{
        "id": "json-flow",
        "name": "From JSON",
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "hi", "type": "message", "text": "Hi {{phone}}"},
            {"id": "end", "type": "end"}
        ],
        "connections": [
            {"id": "c1", "source": "start", "target": "hi"},
            {"id": "c2", "source": "hi", "target": "end"}
        ]
    }"#;
    fs::write(dir.path().join("json-flow.json"), document).unwrap();
    let store = FileGraphStore::new(dir.path());

    let flow = store.load_flow("json-flow").await.unwrap();
    assert_eq!(flow.nodes.len(), 3);
    assert!(flow.connections.iter().all(|c| c.flow_id == "json-flow"));
}

#[tokio::test]
async fn file_store_rejects_mismatched_or_unsafe_ids() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("alias.yaml"), "id: other\nnodes: []\n").unwrap();
    let store = FileGraphStore::new(dir.path());

    assert!(matches!(
        store.load_flow("alias").await,
        Err(StoreError::Invalid { flow_id, .. }) if flow_id == "alias"
    ));
    assert!(matches!(
        store.load_flow("../alias").await,
        Err(StoreError::Invalid { .. })
    ));
    assert!(matches!(
        store.load_flow("missing").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn engine_runs_flows_from_the_file_store() {
    let dir = TempDir::new().unwrap();
    let store = FileGraphStore::new(dir.path());
    store.save(&age_branch_flow()).await.unwrap();
    let channel = RecordingChannel::new();
    let engine = FlowEngine::new(Arc::new(store), channel.clone());

    let report = engine
        .execute("age-check", target(), vars(&[("age", VarValue::from(64))]))
        .await;

    assert_eq!(
        report.outcome,
        RunOutcome::Completed {
            end_node_id: "end1".to_string()
        }
    );
    assert_eq!(channel.texts(), vec!["Welcome adult".to_string()]);
}
