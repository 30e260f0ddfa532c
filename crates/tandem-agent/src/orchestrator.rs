use std::sync::Arc;

use async_stream::try_stream;
use futures::{pin_mut, Stream, StreamExt};
use tracing::{debug, info, warn};

use tandem_core::config::WorkflowConfig;
use tandem_core::error::Result;
use tandem_core::event::EventBus;
use tandem_core::traits::Summarizer;
use tandem_core::types::{Artifact, FlowEvent, NodeId, StatusUpdate, TaskEvent, TaskState};

use crate::graph::{GraphState, NodeAttributes, NodeEvent, WorkflowGraph, WorkflowNode, Workers};
use crate::plan::Plan;

/// Drives one session's workflow graph across external calls.
///
/// The first call seeds a planner node with the query. A planner result
/// expands the graph and restarts it from the new nodes; those internal
/// restarts are invisible to the caller. A paused graph is resumed by the
/// next call, whose query is routed to the node awaiting input. Once the
/// graph completes, a summary of all collected results is emitted and the
/// session starts fresh.
pub struct Orchestrator {
    workers: Workers,
    summarizer: Arc<dyn Summarizer>,
    settings: WorkflowConfig,
    events: Option<Arc<EventBus>>,
    graph: Option<WorkflowGraph>,
    results: Vec<Artifact>,
    plan_context: Option<serde_json::Value>,
}

impl Orchestrator {
    pub fn new(workers: Workers, summarizer: Arc<dyn Summarizer>, settings: WorkflowConfig) -> Self {
        Self {
            workers,
            summarizer,
            settings,
            events: None,
            graph: None,
            results: Vec::new(),
            plan_context: None,
        }
    }

    /// Publish lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// The current session graph, if one is in progress.
    pub fn graph(&self) -> Option<&WorkflowGraph> {
        self.graph.as_ref()
    }

    /// Results collected so far in this session.
    pub fn results(&self) -> &[Artifact] {
        &self.results
    }

    /// Structured context from the latest planner result.
    pub fn plan_context(&self) -> Option<&serde_json::Value> {
        self.plan_context.as_ref()
    }

    /// Drop the graph and everything collected for it.
    pub fn reset(&mut self) {
        self.graph = None;
        self.results.clear();
        self.plan_context = None;
    }

    /// Handle one external call for this session.
    ///
    /// Forwards worker events to the caller, except those produced after a
    /// planner result in the same pass. Errors end the stream; the session
    /// graph is discarded on the next call unless it is paused.
    pub fn handle<'a>(
        &'a mut self,
        query: &'a str,
        task_id: &'a str,
        context_id: &'a str,
    ) -> impl Stream<Item = Result<TaskEvent>> + Send + 'a {
        try_stream! {
            let mut start = self.prepare(query)?;

            loop {
                let Some(graph) = self.graph.as_mut() else {
                    break;
                };
                graph.set_attributes(
                    &start,
                    NodeAttributes::new()
                        .with_task_id(task_id)
                        .with_context_id(context_id),
                )?;

                let mut resuming = false;
                let mut plans: Vec<(NodeId, Plan)> = Vec::new();
                {
                    let run = graph.run(Some(&start));
                    pin_mut!(run);
                    while let Some(item) = run.next().await {
                        let NodeEvent { node_id, event } = item?;
                        match event {
                            TaskEvent::Artifact(artifact)
                                if artifact.name == self.settings.planner_artifact =>
                            {
                                let plan = Plan::from_artifact(&artifact)?;
                                if plan.is_empty() {
                                    warn!(node_id = %node_id, "Planner returned no tasks");
                                } else {
                                    resuming = true;
                                }
                                plans.push((node_id, plan));
                            }
                            TaskEvent::Artifact(artifact) => {
                                self.results.push(artifact.clone());
                                if resuming {
                                    debug!(node_id = %node_id, "Suppressing artifact during restart");
                                } else {
                                    yield TaskEvent::Artifact(artifact);
                                }
                            }
                            status => {
                                if !resuming {
                                    yield status;
                                }
                            }
                        }
                    }
                }

                let mut next_start = None;
                for (after, plan) in plans {
                    if plan.context.is_some() {
                        self.plan_context = plan.context;
                    }
                    if plan.tasks.is_empty() {
                        continue;
                    }
                    let mut cursor = graph.node_handle(&after)?;
                    let mut added = Vec::with_capacity(plan.tasks.len());
                    for task in plan.tasks {
                        cursor = cursor.then(WorkflowNode::new(task.description));
                        added.push(cursor.id().clone());
                    }
                    info!(after = %after, tasks = added.len(), "Expanded workflow graph");
                    if next_start.is_none() {
                        next_start = added.first().cloned();
                    }
                    if let Some(bus) = &self.events {
                        bus.publish(FlowEvent::GraphExpanded { after, added });
                    }
                }

                match next_start {
                    Some(next) if graph.state() != GraphState::Paused => start = next,
                    _ => break,
                }
            }

            let state = self.graph.as_ref().map(WorkflowGraph::state);
            match state {
                Some(GraphState::Paused) => {
                    let status = self.graph.as_ref().and_then(|g| g.pause_status()).cloned();
                    if let Some(status) = status {
                        yield TaskEvent::Status(status);
                    }
                }
                Some(GraphState::Completed) => {
                    let summary = self.summarizer.summarize(&self.results).await?;
                    let collected = self.results.len();
                    info!(results = collected, "Workflow complete, emitting summary");
                    yield TaskEvent::Artifact(Artifact::text(
                        self.settings.summary_artifact.clone(),
                        summary,
                    ));
                    yield TaskEvent::Status(
                        StatusUpdate::new(TaskState::Completed).with_context(context_id),
                    );
                    self.reset();
                    if let Some(bus) = &self.events {
                        bus.publish(FlowEvent::GraphCompleted { results: collected });
                    }
                }
                _ => {}
            }
        }
    }

    /// Pick the start node for this call, creating the graph if needed.
    fn prepare(&mut self, query: &str) -> Result<NodeId> {
        if let Some(graph) = self.graph.as_mut() {
            if let Some(paused) = graph.paused_node_id().cloned() {
                info!(node_id = %paused, "Resuming paused node with new input");
                graph.set_attributes(&paused, NodeAttributes::new().with_query(query))?;
                return Ok(paused);
            }
            warn!(state = ?graph.state(), "Discarding unfinished session graph");
            self.reset();
        }

        let mut graph = WorkflowGraph::new(self.workers.clone())
            .with_unknown_start(self.settings.unknown_start);
        if let Some(bus) = &self.events {
            graph = graph.with_event_bus(bus.clone());
        }
        let planner = WorkflowNode::new(query)
            .with_key(self.settings.planner_key.clone())
            .with_label(self.settings.planner_key.clone());
        let start = graph.add_node(planner).id().clone();
        debug!(node_id = %start, "Seeded planner node");
        self.graph = Some(graph);
        Ok(start)
    }
}
