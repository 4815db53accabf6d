#[path = "../common/mod.rs"]
mod common;

use chatflow::core::flow_graph::action::{ActionContext, ActionError, ActionHandler};
use chatflow::core::flow_graph::actions::webhook::WebhookAction;
use chatflow::core::flow_graph::{
    Flow, FlowEngine, Node, RunErrorKind, RunOutcome, VarValue, Variables,
};
use common::{params, store_with, target, vars, RecordingChannel};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn action_ctx(variables: Variables) -> ActionContext {
    ActionContext {
        run_id: "run-1".to_string(),
        flow_id: "coupon".to_string(),
        node_id: "hook".to_string(),
        target: target(),
        variables,
    }
}

#[tokio::test]
async fn posts_run_state_and_stores_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "flow_id": "coupon",
            "node_id": "hook",
            "recipient": "5511999990000",
            "params": {"campaign": "spring"},
            "variables": {"age": 30.0}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("  SPRING10\n"))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/hook", server.uri());
    let action = WebhookAction::new(Duration::from_secs(5));
    let output = action
        .execute(
            params(&[
                ("url", url.as_str()),
                ("store_as", "coupon"),
                ("campaign", "spring"),
            ]),
            action_ctx(vars(&[("age", VarValue::from(30))])),
        )
        .await
        .expect("webhook should succeed");

    assert_eq!(output.variables["coupon"], VarValue::from("SPRING10"));
}

#[tokio::test]
async fn get_requests_succeed_without_storing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/ping", server.uri());
    let action = WebhookAction::new(Duration::from_secs(5));
    let output = action
        .execute(
            params(&[("url", url.as_str()), ("method", "get")]),
            action_ctx(Variables::new()),
        )
        .await
        .unwrap();

    assert!(output.variables.is_empty());
}

#[tokio::test]
async fn non_success_status_fails_the_action() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = format!("{}/hook", server.uri());
    let action = WebhookAction::new(Duration::from_secs(5));
    let err = action
        .execute(
            params(&[("url", url.as_str())]),
            action_ctx(Variables::new()),
        )
        .await
        .unwrap_err();

    match err {
        ActionError::Failed(message) => assert!(message.contains("500")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let url = server.uri();
    let action = WebhookAction::new(Duration::from_millis(100));
    let err = action
        .execute(
            params(&[("url", url.as_str())]),
            action_ctx(Variables::new()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::Failed(message) if message.contains("timed out")));
}

fn coupon_flow(hook_url: &str) -> Flow {
    let mut flow = Flow::new("coupon", "owner-1", "Coupon");
    flow.add_node(Node::start("start"))
        .add_node(Node::action(
            "hook",
            "webhook",
            params(&[
                ("url", hook_url),
                ("store_as", "coupon"),
                ("campaign", "{{campaign}}"),
            ]),
        ))
        .add_node(Node::message("reply", "Your coupon: {{coupon}}"))
        .add_node(Node::end("end"));
    flow.connect("start", "hook")
        .connect("hook", "reply")
        .connect("reply", "end");
    flow
}

#[tokio::test]
async fn engine_feeds_webhook_response_into_later_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/coupons"))
        .and(body_partial_json(json!({"params": {"campaign": "spring"}})))
        .respond_with(ResponseTemplate::new(200).set_body_string("SPRING10"))
        .expect(1)
        .mount(&server)
        .await;

    let channel = RecordingChannel::new();
    let flow = coupon_flow(&format!("{}/coupons", server.uri()));
    let engine = FlowEngine::new(store_with(vec![flow]), channel.clone());

    let report = engine
        .execute(
            "coupon",
            target(),
            vars(&[("campaign", VarValue::from("spring"))]),
        )
        .await;

    assert!(report.outcome.is_completed(), "{:?}", report.outcome);
    assert_eq!(channel.texts(), vec!["Your coupon: SPRING10".to_string()]);
    assert_eq!(report.variables["coupon"], VarValue::from("SPRING10"));
}

#[tokio::test]
async fn engine_reports_failed_webhook_at_its_node() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let channel = RecordingChannel::new();
    let flow = coupon_flow(&format!("{}/coupons", server.uri()));
    let engine = FlowEngine::new(store_with(vec![flow]), channel.clone());

    let report = engine.execute("coupon", target(), Variables::new()).await;

    match &report.outcome {
        RunOutcome::Error { kind, node_id, .. } => {
            assert_eq!(*kind, RunErrorKind::ActionFailed);
            assert_eq!(node_id.as_deref(), Some("hook"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(channel.sent().is_empty());
}
