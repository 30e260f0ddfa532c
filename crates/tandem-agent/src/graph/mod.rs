//! Workflow graph engine: a sequential DAG runner with suspend/resume.
//!
//! A workflow is a directed graph of `WorkflowNode`s; an edge means the
//! predecessor runs before the successor. Each node delegates its task to an
//! external worker and streams the worker's events back.
//!
//! `WorkflowGraph::run` executes the nodes reachable from a start node in
//! topological order, one at a time. A worker asking for more input pauses
//! the graph at that node; a later `run` from the same node resumes it.

pub mod attributes;
pub mod executor;
pub mod node;

pub use attributes::NodeAttributes;
pub use executor::{GraphState, NodeEvent, NodeHandle, WorkflowGraph};
pub use node::{NodeState, WorkflowNode, Workers};
