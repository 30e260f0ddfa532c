use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

use tandem_core::config::UnknownStart;
use tandem_core::error::{Result, TandemError};
use tandem_core::event::EventBus;
use tandem_core::types::{FlowEvent, NodeId, StatusUpdate, TaskEvent};

use super::attributes::NodeAttributes;
use super::node::{NodeState, WorkflowNode, Workers};

/// Lifecycle state of a whole graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Initialized,
    Running,
    Paused,
    Completed,
}

/// An event forwarded by a run, tagged with the node that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEvent {
    pub node_id: NodeId,
    pub event: TaskEvent,
}

/// Handle to a registered node, used to chain successors.
pub struct NodeHandle<'g> {
    graph: &'g mut WorkflowGraph,
    id: NodeId,
}

impl<'g> NodeHandle<'g> {
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Register `next` and add an edge from this node to it.
    pub fn then(self, next: WorkflowNode) -> NodeHandle<'g> {
        let next_id = next.id().clone();
        self.graph.insert(next);
        self.graph.link(&self.id, &next_id);
        NodeHandle {
            graph: self.graph,
            id: next_id,
        }
    }
}

/// A sequential DAG runner with suspend/resume at a single node.
///
/// Nodes live in an arena keyed by id; edges are an adjacency list meaning
/// "predecessor runs before successor". Each `run` snapshots its execution
/// order on entry, so nodes added while a run's events are being consumed
/// only take effect on the next `run`.
pub struct WorkflowGraph {
    nodes: HashMap<NodeId, WorkflowNode>,
    /// Insertion order, keeps topological sorting deterministic.
    order: Vec<NodeId>,
    edges: HashMap<NodeId, Vec<NodeId>>,
    attributes: HashMap<NodeId, NodeAttributes>,
    state: GraphState,
    paused_node: Option<NodeId>,
    pause_status: Option<StatusUpdate>,
    workers: Workers,
    unknown_start: UnknownStart,
    events: Option<Arc<EventBus>>,
}

impl WorkflowGraph {
    pub fn new(workers: Workers) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            attributes: HashMap::new(),
            state: GraphState::Initialized,
            paused_node: None,
            pause_status: None,
            workers,
            unknown_start: UnknownStart::default(),
            events: None,
        }
    }

    /// Choose how `run` treats a start id that is not registered.
    pub fn with_unknown_start(mut self, policy: UnknownStart) -> Self {
        self.unknown_start = policy;
        self
    }

    /// Publish lifecycle events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Register a node and return a handle for chaining successors.
    pub fn add_node(&mut self, node: WorkflowNode) -> NodeHandle<'_> {
        let id = node.id().clone();
        self.insert(node);
        NodeHandle { graph: self, id }
    }

    /// Handle to an already registered node.
    pub fn node_handle(&mut self, id: &NodeId) -> Result<NodeHandle<'_>> {
        if !self.nodes.contains_key(id) {
            return Err(TandemError::Configuration(format!(
                "Node '{}' not found in graph",
                id
            )));
        }
        Ok(NodeHandle {
            graph: self,
            id: id.clone(),
        })
    }

    /// Add an edge `from -> to`. Both nodes must already be registered.
    pub fn add_edge(&mut self, from: &NodeId, to: &NodeId) -> Result<()> {
        for id in [from, to] {
            if !self.nodes.contains_key(id) {
                return Err(TandemError::Configuration(format!(
                    "Edge {} -> {} references unknown node '{}'",
                    from, to, id
                )));
            }
        }
        self.link(from, to);
        Ok(())
    }

    /// Merge run-scoped metadata onto a node.
    pub fn set_attributes(&mut self, id: &NodeId, attrs: NodeAttributes) -> Result<()> {
        if !self.nodes.contains_key(id) {
            return Err(TandemError::Configuration(format!(
                "Node '{}' not found in graph",
                id
            )));
        }
        self.attributes.entry(id.clone()).or_default().merge(&attrs);
        Ok(())
    }

    pub fn attributes(&self, id: &NodeId) -> Option<&NodeAttributes> {
        self.attributes.get(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn successors(&self, id: &NodeId) -> &[NodeId] {
        self.edges.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn has_edge(&self, from: &NodeId, to: &NodeId) -> bool {
        self.successors(from).contains(to)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Node awaiting input, only while the graph is paused.
    pub fn paused_node_id(&self) -> Option<&NodeId> {
        match self.state {
            GraphState::Paused => self.paused_node.as_ref(),
            _ => None,
        }
    }

    /// Status update that paused the graph, if it is paused.
    pub fn pause_status(&self) -> Option<&StatusUpdate> {
        match self.state {
            GraphState::Paused => self.pause_status.as_ref(),
            _ => None,
        }
    }

    /// Nodes with no incoming edges, in insertion order.
    pub fn roots(&self) -> Vec<NodeId> {
        let targets: HashSet<&NodeId> = self.edges.values().flatten().collect();
        self.order
            .iter()
            .filter(|id| !targets.contains(id))
            .cloned()
            .collect()
    }

    /// Topological order of the whole graph (Kahn's algorithm).
    ///
    /// Ties are broken by insertion order. Nodes on a cycle are left out.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: HashMap<&NodeId, usize> =
            self.order.iter().map(|id| (id, 0)).collect();
        for to in self.edges.values().flatten() {
            if let Some(deg) = in_degree.get_mut(to) {
                *deg += 1;
            }
        }

        let mut queue: VecDeque<&NodeId> = self
            .order
            .iter()
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while let Some(id) = queue.pop_front() {
            sorted.push(id.clone());
            for next in self.successors(id) {
                if let Some(deg) = in_degree.get_mut(next) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        if sorted.len() != self.order.len() {
            warn!(
                sorted = sorted.len(),
                total = self.order.len(),
                "Graph contains a cycle; skipping unsortable nodes"
            );
        }
        sorted
    }

    /// Snapshot the execution order for a run starting at `start`.
    pub fn execution_order(&self, start: Option<&NodeId>) -> Result<Vec<NodeId>> {
        let start_set = match start {
            Some(id) if self.nodes.contains_key(id) => vec![id.clone()],
            Some(id) if self.unknown_start == UnknownStart::Reject => {
                return Err(TandemError::Configuration(format!(
                    "Start node '{}' not found in graph",
                    id
                )));
            }
            Some(id) => {
                debug!(start = %id, "Unknown start node, running from all roots");
                self.roots()
            }
            None => self.roots(),
        };

        let applicable = self.descendants(&start_set);
        Ok(self
            .topological_order()
            .into_iter()
            .filter(|id| applicable.contains(id))
            .collect())
    }

    /// Start nodes plus everything reachable from them.
    fn descendants(&self, start_set: &[NodeId]) -> HashSet<NodeId> {
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<&NodeId> = start_set.iter().collect();
        while let Some(id) = stack.pop() {
            if seen.insert(id.clone()) {
                stack.extend(self.successors(id));
            }
        }
        seen
    }

    /// Run the applicable subgraph from `start`, one node at a time.
    ///
    /// A node signalling "input required" pauses the graph: its remaining
    /// events are drained but not forwarded, and later nodes of this pass are
    /// skipped. Resume by calling `run` with the paused node's id. Errors from
    /// a node's stream end the run and leave the graph as it was at that point.
    pub fn run<'a>(
        &'a mut self,
        start: Option<&'a NodeId>,
    ) -> impl Stream<Item = Result<NodeEvent>> + Send + 'a {
        try_stream! {
            let order = self.execution_order(start)?;
            self.release_abandoned_pause(&order);
            self.state = GraphState::Running;
            self.pause_status = None;
            info!(nodes = order.len(), start = ?start, "Running workflow graph");

            for node_id in order {
                let (task, task_id, context_id) = {
                    let attrs = self.attributes.get(&node_id);
                    let Some(node) = self.nodes.get_mut(&node_id) else {
                        continue;
                    };
                    node.state = NodeState::Running;
                    let task = attrs
                        .and_then(|a| a.query())
                        .unwrap_or(node.task.as_str())
                        .to_string();
                    (
                        task,
                        attrs.and_then(|a| a.task_id()).map(str::to_string),
                        attrs.and_then(|a| a.context_id()).map(str::to_string),
                    )
                };
                info!(node_id = %node_id, "Executing graph node");
                self.publish(FlowEvent::NodeStarted { node_id: node_id.clone() });

                let mut events = match self.nodes.get(&node_id) {
                    Some(node) => {
                        node.execute(&self.workers, &task, task_id.as_deref(), context_id.as_deref())
                            .await?
                    }
                    None => continue,
                };

                while let Some(event) = events.next().await {
                    let event = event?;
                    if let Some(node) = self.nodes.get_mut(&node_id) {
                        node.observe(&event);
                    }

                    if self.state == GraphState::Paused {
                        debug!(node_id = %node_id, "Draining event after pause");
                        continue;
                    }

                    if let TaskEvent::Status(status) = &event {
                        if event.is_pause_signal() {
                            self.pause_at(&node_id, status.clone());
                            continue;
                        }
                    }

                    yield NodeEvent { node_id: node_id.clone(), event };
                }

                if self.state == GraphState::Paused {
                    break;
                }

                if let Some(node) = self.nodes.get_mut(&node_id) {
                    if node.state == NodeState::Running {
                        node.state = NodeState::Completed;
                        debug!(node_id = %node_id, "Node execution complete");
                        self.publish(FlowEvent::NodeCompleted { node_id: node_id.clone() });
                    }
                }
            }

            if self.state != GraphState::Paused {
                self.state = GraphState::Completed;
                self.paused_node = None;
                info!("Workflow graph complete");
            }
        }
    }

    fn pause_at(&mut self, node_id: &NodeId, status: StatusUpdate) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.state = NodeState::Paused;
        }
        let context_id = status.context_id.clone().unwrap_or_default();
        self.state = GraphState::Paused;
        self.paused_node = Some(node_id.clone());
        self.pause_status = Some(status);
        info!(node_id = %node_id, context_id = %context_id, "Graph paused for input");
        self.publish(FlowEvent::NodePaused {
            node_id: node_id.clone(),
            context_id,
        });
    }

    /// A paused node left out of the next run goes back to `Ready`, so at
    /// most one node is ever paused and only while the graph is.
    fn release_abandoned_pause(&mut self, order: &[NodeId]) {
        let Some(paused) = self.paused_node.take() else {
            return;
        };
        if order.contains(&paused) {
            return;
        }
        if let Some(node) = self.nodes.get_mut(&paused) {
            if node.state == NodeState::Paused {
                warn!(node_id = %paused, "Run does not resume paused node, resetting it");
                node.state = NodeState::Ready;
            }
        }
    }

    /// Registered nodes are never replaced; a second node with the same id
    /// is dropped so the original keeps its state and result.
    fn insert(&mut self, node: WorkflowNode) {
        let id = node.id().clone();
        if self.nodes.contains_key(&id) {
            warn!(node_id = %id, "Node already registered, keeping existing node");
            return;
        }
        self.nodes.insert(id.clone(), node);
        self.order.push(id);
    }

    fn link(&mut self, from: &NodeId, to: &NodeId) {
        let successors = self.edges.entry(from.clone()).or_default();
        if !successors.contains(to) {
            successors.push(to.clone());
        }
    }

    fn publish(&self, event: FlowEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}
