pub mod graph;
pub mod orchestrator;
pub mod plan;
pub mod registry;
pub mod script;
pub mod session;
pub mod summary;

pub use graph::{
    GraphState, NodeAttributes, NodeEvent, NodeHandle, NodeState, WorkflowGraph, WorkflowNode,
    Workers,
};
pub use orchestrator::Orchestrator;
pub use plan::{Plan, PlannedTask};
pub use registry::{CapabilityRegistry, WorkerCapability};
pub use script::{Script, ScriptedCall, ScriptedTransport};
pub use session::SessionManager;
pub use summary::ConcatSummarizer;
