use std::path::PathBuf;
use std::sync::Arc;

use futures::TryStreamExt;

use tandem_agent::{
    CapabilityRegistry, ConcatSummarizer, Script, ScriptedTransport, SessionManager, Workers,
};
use tandem_core::config::AppConfig;
use tandem_core::types::{Artifact, StatusUpdate, TaskEvent, TaskState};

fn demo(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos").join(file)
}

#[tokio::test]
async fn test_demo_trip_replays_end_to_end() {
    let config = AppConfig::load(&demo("tandem.toml")).expect("load demo config");
    let transport = Arc::new(ScriptedTransport::new(
        Script::load(&demo("trip.json")).expect("load demo script"),
    ));
    let workers = Workers::new(
        Arc::new(CapabilityRegistry::from_config(&config)),
        transport.clone(),
        config.workflow.planner_key.clone(),
    );
    let sessions = SessionManager::new(
        workers,
        Arc::new(ConcatSummarizer::new()),
        config.workflow.clone(),
    );

    let first: Vec<TaskEvent> = sessions
        .handle("Plan a weekend trip".into(), "t1".into(), "demo".into())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        first,
        vec![
            TaskEvent::Status(StatusUpdate::new(TaskState::Working)),
            TaskEvent::Status(
                StatusUpdate::new(TaskState::InputRequired)
                    .with_message("Where and when?")
                    .with_context("demo")
            ),
        ]
    );

    let second: Vec<TaskEvent> = sessions
        .handle("Lisbon, next Friday".into(), "t2".into(), "demo".into())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        second,
        vec![
            TaskEvent::Status(StatusUpdate::new(TaskState::Working)),
            TaskEvent::Artifact(Artifact::text("flight", "TP1351 departs 18:05")),
            TaskEvent::Artifact(Artifact::text("hotel", "Casa do Rio, 2 nights")),
            TaskEvent::Artifact(Artifact::text(
                "summary",
                "TP1351 departs 18:05\nCasa do Rio, 2 nights"
            )),
            TaskEvent::Status(StatusUpdate::new(TaskState::Completed).with_context("demo")),
        ]
    );

    let routed: Vec<String> = transport.calls().into_iter().map(|c| c.worker_id).collect();
    assert_eq!(routed, vec!["planner", "planner", "flights", "hotels"]);
    assert_eq!(transport.calls()[1].task, "Lisbon, next Friday");
}
