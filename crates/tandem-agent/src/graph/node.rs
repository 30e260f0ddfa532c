use std::sync::Arc;

use tracing::debug;

use tandem_core::error::Result;
use tandem_core::traits::{EventStream, WorkerResolver, WorkerTransport};
use tandem_core::types::{Artifact, NodeId, TaskEvent, WorkerRef};

/// Collaborators a node needs to reach its worker.
#[derive(Clone)]
pub struct Workers {
    pub resolver: Arc<dyn WorkerResolver>,
    pub transport: Arc<dyn WorkerTransport>,
    /// Nodes tagged with this key are routed to the planner worker.
    pub planner_key: String,
}

impl Workers {
    pub fn new(
        resolver: Arc<dyn WorkerResolver>,
        transport: Arc<dyn WorkerTransport>,
        planner_key: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            transport,
            planner_key: planner_key.into(),
        }
    }
}

impl std::fmt::Debug for Workers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workers")
            .field("planner_key", &self.planner_key)
            .finish_non_exhaustive()
    }
}

/// Lifecycle state of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Ready,
    Running,
    Paused,
    Completed,
}

/// A single delegatable unit of work.
///
/// Each execution is one real call to an external worker. The node keeps
/// the latest artifact it has seen; run-scoped data (task id, context id,
/// follow-up query) lives in the graph's attribute map instead.
#[derive(Debug)]
pub struct WorkflowNode {
    id: NodeId,
    /// Description delegated to the worker.
    pub task: String,
    /// Semantic routing tag, e.g. "planner".
    pub key: Option<String>,
    pub label: Option<String>,
    pub(crate) state: NodeState,
    result: Option<Artifact>,
}

impl WorkflowNode {
    /// Create a ready node with a fresh id.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            task: task.into(),
            key: None,
            label: None,
            state: NodeState::Ready,
            result: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    /// Set the routing key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Latest artifact received by this node.
    pub fn result(&self) -> Option<&Artifact> {
        self.result.as_ref()
    }

    pub fn is_planner(&self, planner_key: &str) -> bool {
        self.key.as_deref() == Some(planner_key)
    }

    /// Resolve this node's worker and start the remote call.
    ///
    /// Resolution and transport failures propagate unchanged. The returned
    /// stream belongs to this single interaction and cannot be replayed.
    pub async fn execute(
        &self,
        workers: &Workers,
        task: &str,
        task_id: Option<&str>,
        context_id: Option<&str>,
    ) -> Result<EventStream> {
        let worker: WorkerRef = if self.is_planner(&workers.planner_key) {
            workers.resolver.resolve_planner().await?
        } else {
            workers.resolver.resolve(&self.task).await?
        };

        debug!(
            node_id = %self.id,
            worker = %worker.worker_id,
            task_id = task_id.unwrap_or("-"),
            context_id = context_id.unwrap_or("-"),
            "Calling worker"
        );

        workers
            .transport
            .call(&worker, task, task_id, context_id)
            .await
    }

    /// Record an event from this node's own stream.
    ///
    /// Artifacts overwrite the stored result, except append chunks of the
    /// same artifact which extend it.
    pub fn observe(&mut self, event: &TaskEvent) {
        let TaskEvent::Artifact(artifact) = event else {
            return;
        };

        match self.result.as_mut() {
            Some(current) if artifact.append && current.name == artifact.name => {
                current.parts.extend(artifact.parts.iter().cloned());
                current.last_chunk = artifact.last_chunk;
            }
            _ => self.result = Some(artifact.clone()),
        }
    }
}
