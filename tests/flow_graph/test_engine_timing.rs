#[path = "../common/mod.rs"]
mod common;

use chatflow::core::flow_graph::{
    EngineSettings, FlowEngine, RunErrorKind, RunOutcome, RunTrigger, VarValue, Variables,
};
use common::{age_branch_flow, delayed_flow, store_with, target, vars, RecordingChannel};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn message_delay_suspends_before_next_node() {
    let channel = RecordingChannel::new();
    let engine = FlowEngine::new(store_with(vec![delayed_flow(30, None)]), channel.clone());

    let started = Instant::now();
    let report = engine.execute("delayed", target(), Variables::new()).await;

    assert!(report.outcome.is_completed());
    assert_eq!(channel.texts(), vec!["first".to_string(), "second".to_string()]);
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn connection_delay_overrides_node_delay() {
    let channel = RecordingChannel::new();
    let engine = FlowEngine::new(
        store_with(vec![delayed_flow(600, Some(5))]),
        channel.clone(),
    );

    let started = Instant::now();
    let report = engine.execute("delayed", target(), Variables::new()).await;

    assert!(report.outcome.is_completed());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5));
    assert!(elapsed < Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_spawned_run_interrupts_its_delay() {
    let channel = RecordingChannel::new();
    let engine = FlowEngine::new(store_with(vec![delayed_flow(3600, None)]), channel.clone());

    let handle = engine.spawn("delayed", target(), Variables::new(), RunTrigger::default());
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!handle.is_finished());
    handle.cancel();

    let report = handle.join().await.expect("run task should not panic");
    assert_eq!(
        report.outcome.error_kind(),
        Some(RunErrorKind::Cancelled)
    );
    match &report.outcome {
        RunOutcome::Error { node_id, .. } => assert_eq!(node_id.as_deref(), Some("first")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(channel.texts(), vec!["first".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_send_times_out_as_delivery_failure() {
    let channel = RecordingChannel::hanging();
    let settings = EngineSettings {
        send_timeout: Duration::from_secs(2),
        ..EngineSettings::default()
    };
    let engine = FlowEngine::new(store_with(vec![age_branch_flow()]), channel)
        .with_settings(settings);

    let report = engine
        .execute("age-check", target(), vars(&[("age", VarValue::from(40))]))
        .await;

    match &report.outcome {
        RunOutcome::Error {
            kind,
            node_id,
            message,
        } => {
            assert_eq!(*kind, RunErrorKind::DeliveryFailed);
            assert_eq!(node_id.as_deref(), Some("adult"));
            assert!(message.contains("2000ms"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}
