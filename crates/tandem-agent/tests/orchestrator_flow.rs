use std::sync::Arc;

use futures::{pin_mut, StreamExt, TryStreamExt};
use serde_json::json;

use tandem_agent::{GraphState, NodeState, Orchestrator, SessionManager, Workers};
use tandem_core::config::WorkflowConfig;
use tandem_core::error::{Result, TandemError};
use tandem_core::event::EventBus;
use tandem_core::types::{Artifact, FlowEvent, NodeId, StatusUpdate, TaskEvent, TaskState};
use tandem_test_utils::{
    input_required, planner_result, text_artifact, working, RecordingSummarizer,
    RecordingTransport, StaticResolver, PLANNER,
};

struct Harness {
    orchestrator: Orchestrator,
    transport: Arc<RecordingTransport>,
    summarizer: Arc<RecordingSummarizer>,
    bus: Arc<EventBus>,
}

fn harness() -> Harness {
    let transport = Arc::new(RecordingTransport::new());
    let summarizer = Arc::new(RecordingSummarizer::new("Trip booked"));
    let bus = Arc::new(EventBus::new(64));
    let workers = Workers::new(Arc::new(StaticResolver::new()), transport.clone(), PLANNER);
    let orchestrator = Orchestrator::new(workers, summarizer.clone(), WorkflowConfig::default())
        .with_event_bus(bus.clone());
    Harness {
        orchestrator,
        transport,
        summarizer,
        bus,
    }
}

async fn turn(orch: &mut Orchestrator, query: &str) -> Result<Vec<TaskEvent>> {
    orch.handle(query, "t1", "c1").try_collect().await
}

fn summary() -> TaskEvent {
    text_artifact("summary", "Trip booked")
}

fn done() -> TaskEvent {
    TaskEvent::Status(StatusUpdate::new(TaskState::Completed).with_context("c1"))
}

fn drain_bus(rx: &mut tokio::sync::broadcast::Receiver<FlowEvent>) -> Vec<FlowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_planner_result_expands_and_restarts_invisibly() {
    let mut h = harness();
    let mut rx = h.bus.subscribe();
    h.transport.reply(
        PLANNER,
        vec![
            planner_result(&["x", "y"], Some(json!({"destination": "Lisbon"}))),
            text_artifact("planner_note", "hidden"),
            working(),
        ],
    );
    h.transport.reply("x", vec![text_artifact("x_out", "X done")]);
    h.transport.reply("y", vec![text_artifact("y_out", "Y done")]);

    let events = turn(&mut h.orchestrator, "Plan a trip").await.unwrap();

    assert_eq!(
        events,
        vec![
            text_artifact("x_out", "X done"),
            text_artifact("y_out", "Y done"),
            summary(),
            done(),
        ]
    );

    let flow = drain_bus(&mut rx);
    let planner_id = match &flow[0] {
        FlowEvent::NodeStarted { node_id } => node_id.clone(),
        other => panic!("unexpected first event: {:?}", other),
    };
    let (after, added) = flow
        .iter()
        .find_map(|e| match e {
            FlowEvent::GraphExpanded { after, added } => Some((after.clone(), added.clone())),
            _ => None,
        })
        .expect("graph expanded");
    assert_eq!(after, planner_id);
    assert_eq!(added.len(), 2);
    assert!(flow
        .iter()
        .any(|e| matches!(e, FlowEvent::GraphCompleted { results: 3 })));

    // Restart began at the first new node, stamped with the caller's ids.
    let calls = h.transport.calls();
    let tasks: Vec<&str> = calls.iter().map(|c| c.task.as_str()).collect();
    assert_eq!(tasks, vec!["Plan a trip", "x", "y"]);
    assert_eq!(calls[1].task_id.as_deref(), Some("t1"));
    assert_eq!(calls[1].context_id.as_deref(), Some("c1"));

    // Suppressed artifacts are still collected for the summary.
    let seen: Vec<String> = h.summarizer.seen()[0].iter().map(|a| a.name.clone()).collect();
    assert_eq!(seen, vec!["planner_note", "x_out", "y_out"]);

    // Completed sessions reset.
    assert!(h.orchestrator.graph().is_none());
    assert!(h.orchestrator.results().is_empty());
    assert!(h.orchestrator.plan_context().is_none());
}

#[tokio::test]
async fn test_events_before_planner_result_are_forwarded() {
    let mut h = harness();
    h.transport.reply(
        PLANNER,
        vec![working(), planner_result(&["x"], None), working()],
    );
    h.transport.reply("x", vec![]);

    let events = turn(&mut h.orchestrator, "go").await.unwrap();

    assert_eq!(events, vec![working(), summary(), done()]);
}

#[tokio::test]
async fn test_repeated_clarification_keeps_node_identity() {
    let mut h = harness();
    h.transport
        .reply(PLANNER, vec![input_required("c1", "Which city?")]);
    h.transport
        .reply(PLANNER, vec![input_required("c1", "Which dates?")]);
    h.transport.reply(
        PLANNER,
        vec![planner_result(&["Book flight"], Some(json!({"city": "Paris"})))],
    );
    h.transport
        .reply("Book flight", vec![text_artifact("ticket", "AF1")]);

    let first = turn(&mut h.orchestrator, "Plan a trip").await.unwrap();
    assert_eq!(first, vec![input_required("c1", "Which city?")]);
    let graph = h.orchestrator.graph().unwrap();
    let paused: NodeId = graph.paused_node_id().cloned().unwrap();
    assert_eq!(graph.len(), 1);

    let second = turn(&mut h.orchestrator, "Paris").await.unwrap();
    assert_eq!(second, vec![input_required("c1", "Which dates?")]);
    let graph = h.orchestrator.graph().unwrap();
    assert_eq!(graph.paused_node_id(), Some(&paused));
    assert_eq!(graph.len(), 1);
    assert_eq!(graph.node(&paused).unwrap().state(), NodeState::Paused);

    let third = turn(&mut h.orchestrator, "May 3").await.unwrap();
    assert_eq!(third, vec![text_artifact("ticket", "AF1"), summary(), done()]);

    // Follow-up answers went to the same planner node.
    assert_eq!(
        h.transport.tasks_for(PLANNER),
        vec!["Plan a trip", "Paris", "May 3"]
    );
    assert!(h.orchestrator.graph().is_none());
}

#[tokio::test]
async fn test_expansion_while_paused_waits_for_resume() {
    let mut h = harness();
    h.transport.reply(
        PLANNER,
        vec![
            planner_result(&["x"], Some(json!({"days": 2}))),
            input_required("c1", "Confirm budget?"),
        ],
    );

    let first = turn(&mut h.orchestrator, "trip").await.unwrap();
    assert_eq!(first, vec![input_required("c1", "Confirm budget?")]);
    let graph = h.orchestrator.graph().unwrap();
    assert_eq!(graph.state(), GraphState::Paused);
    assert_eq!(graph.len(), 2);
    assert!(h.transport.tasks_for("x").is_empty());
    assert_eq!(h.orchestrator.plan_context(), Some(&json!({"days": 2})));

    h.transport.reply(PLANNER, vec![working()]);
    h.transport.reply("x", vec![text_artifact("x_out", "done")]);
    let second = turn(&mut h.orchestrator, "yes").await.unwrap();

    assert_eq!(
        second,
        vec![working(), text_artifact("x_out", "done"), summary(), done()]
    );
}

#[tokio::test]
async fn test_malformed_planner_result_is_typed_error() {
    let mut h = harness();
    h.transport.reply(
        PLANNER,
        vec![TaskEvent::Artifact(Artifact::data(
            "planner_result",
            json!({"steps": ["x"]}),
        ))],
    );

    let err = turn(&mut h.orchestrator, "trip").await.unwrap_err();

    assert!(matches!(err, TandemError::MalformedExpansion(_)));
    assert!(h.summarizer.seen().is_empty());
}

#[tokio::test]
async fn test_empty_plan_completes_without_restart() {
    let mut h = harness();
    h.transport
        .reply(PLANNER, vec![planner_result(&[], None), working()]);

    let events = turn(&mut h.orchestrator, "nothing to do").await.unwrap();

    assert_eq!(events, vec![working(), summary(), done()]);
    assert_eq!(h.transport.calls().len(), 1);
}

#[tokio::test]
async fn test_failed_session_starts_fresh_next_call() {
    let mut h = harness();
    h.transport
        .reply_then_fail(PLANNER, vec![working()], "worker crashed");

    {
        let events = h.orchestrator.handle("first", "t1", "c1");
        pin_mut!(events);
        assert_eq!(events.next().await.unwrap().unwrap(), working());
        assert!(events.next().await.unwrap().is_err());
        assert!(events.next().await.is_none());
    }
    assert_eq!(
        h.orchestrator.graph().map(|g| g.state()),
        Some(GraphState::Running)
    );

    h.transport.reply(PLANNER, vec![text_artifact("answer", "42")]);
    let events = turn(&mut h.orchestrator, "second").await.unwrap();

    assert_eq!(events, vec![text_artifact("answer", "42"), summary(), done()]);
    assert_eq!(h.transport.tasks_for(PLANNER), vec!["first", "second"]);
    assert!(h.orchestrator.graph().is_none());
}

#[tokio::test]
async fn test_sessions_do_not_share_graphs() {
    let transport = Arc::new(RecordingTransport::new());
    let workers = Workers::new(Arc::new(StaticResolver::new()), transport.clone(), PLANNER);
    let manager = SessionManager::new(
        workers,
        Arc::new(RecordingSummarizer::new("ok")),
        WorkflowConfig::default(),
    );
    transport.reply(PLANNER, vec![input_required("a", "Where?")]);
    transport.reply(PLANNER, vec![text_artifact("answer", "done")]);

    let a: Vec<TaskEvent> = manager
        .handle("trip A".into(), "t-a".into(), "a".into())
        .try_collect()
        .await
        .unwrap();
    let b: Vec<TaskEvent> = manager
        .handle("trip B".into(), "t-b".into(), "b".into())
        .try_collect()
        .await
        .unwrap();

    assert_eq!(a, vec![input_required("a", "Where?")]);
    assert_eq!(b.len(), 3);

    let session_a = manager.orchestrator("a");
    let session_b = manager.orchestrator("b");
    assert_eq!(
        session_a.lock().await.graph().map(|g| g.state()),
        Some(GraphState::Paused)
    );
    assert!(session_b.lock().await.graph().is_none());
}
