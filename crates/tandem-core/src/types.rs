use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique workflow node identifier.
///
/// Generated once when a node is created and never reused, so a node keeps
/// the same id across any number of pause/resume cycles.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State reported by a remote worker in a status update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
    #[serde(other)]
    Unknown,
}

/// One part of an artifact payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: serde_json::Value },
}

/// A unit of produced output attached to a task's result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub name: String,
    #[serde(default)]
    pub parts: Vec<Part>,
    /// Chunk extends the previous artifact of the same name.
    #[serde(default)]
    pub append: bool,
    /// Last chunk of this artifact.
    #[serde(default = "default_last_chunk")]
    pub last_chunk: bool,
}

fn default_last_chunk() -> bool {
    true
}

impl Artifact {
    pub fn new(name: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            name: name.into(),
            parts,
            append: false,
            last_chunk: true,
        }
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, vec![Part::Text { text: text.into() }])
    }

    pub fn data(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(name, vec![Part::Data { data }])
    }

    pub fn is_final(&self) -> bool {
        self.last_chunk
    }

    /// Concatenate all text parts.
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A status update from a remote worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusUpdate {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl StatusUpdate {
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            message: None,
            context_id: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }
}

/// An event produced by a remote worker call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvent {
    Status(StatusUpdate),
    Artifact(Artifact),
}

impl TaskEvent {
    /// A worker asking for more input on a known context suspends the graph.
    pub fn is_pause_signal(&self) -> bool {
        match self {
            TaskEvent::Status(status) => {
                status.state == TaskState::InputRequired
                    && status.context_id.as_deref().is_some_and(|c| !c.is_empty())
            }
            TaskEvent::Artifact(_) => false,
        }
    }

    pub fn as_artifact(&self) -> Option<&Artifact> {
        match self {
            TaskEvent::Artifact(a) => Some(a),
            TaskEvent::Status(_) => None,
        }
    }
}

/// A resolved worker that the transport knows how to call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerRef {
    pub worker_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl WorkerRef {
    pub fn new(worker_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            name: name.into(),
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

/// Workflow lifecycle notification broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A node started executing.
    NodeStarted { node_id: NodeId },
    /// A node asked for more input and suspended the graph.
    NodePaused { node_id: NodeId, context_id: String },
    /// A node drained its event sequence without pausing.
    NodeCompleted { node_id: NodeId },
    /// A planner result added nodes after `after`.
    GraphExpanded { after: NodeId, added: Vec<NodeId> },
    /// The graph finished and the session summary was emitted.
    GraphCompleted { results: usize },
}
