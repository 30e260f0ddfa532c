use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::*;

/// A finite, non-restartable sequence of events from one remote call.
pub type EventStream = BoxStream<'static, Result<TaskEvent>>;

/// Worker resolver — maps work to a callable worker.
pub trait WorkerResolver: Send + Sync + 'static {
    /// Resolve a worker whose capabilities match the task description.
    fn resolve(&self, task: &str) -> BoxFuture<'_, Result<WorkerRef>>;

    /// Resolve the fixed planner worker.
    fn resolve_planner(&self) -> BoxFuture<'_, Result<WorkerRef>>;
}

/// Remote call transport — one call per node execution.
pub trait WorkerTransport: Send + Sync + 'static {
    /// Send a task to a worker and receive its event stream.
    ///
    /// Each call is a real outbound interaction; callers never retry.
    fn call(
        &self,
        worker: &WorkerRef,
        task: &str,
        task_id: Option<&str>,
        context_id: Option<&str>,
    ) -> BoxFuture<'_, Result<EventStream>>;
}

/// Summary generator — turns collected results into final text.
pub trait Summarizer: Send + Sync + 'static {
    fn summarize(&self, results: &[Artifact]) -> BoxFuture<'_, Result<String>>;
}
