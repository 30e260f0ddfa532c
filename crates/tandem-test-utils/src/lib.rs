//! Shared fixtures and recording mocks for Tandem tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::StreamExt;

use tandem_core::error::{Result, TandemError};
use tandem_core::traits::{EventStream, Summarizer, WorkerResolver, WorkerTransport};
use tandem_core::types::{Artifact, StatusUpdate, TaskEvent, TaskState, WorkerRef};

pub const PLANNER: &str = "planner";

// ── Event fixtures ──────────────────────────────────────────────

pub fn working() -> TaskEvent {
    TaskEvent::Status(StatusUpdate::new(TaskState::Working))
}

pub fn input_required(context_id: &str, message: &str) -> TaskEvent {
    TaskEvent::Status(
        StatusUpdate::new(TaskState::InputRequired)
            .with_context(context_id)
            .with_message(message),
    )
}

pub fn completed() -> TaskEvent {
    TaskEvent::Status(StatusUpdate::new(TaskState::Completed))
}

pub fn text_artifact(name: &str, text: &str) -> TaskEvent {
    TaskEvent::Artifact(Artifact::text(name, text))
}

/// A planner-result artifact listing `tasks` in order.
pub fn planner_result(tasks: &[&str], trip_info: Option<serde_json::Value>) -> TaskEvent {
    let tasks: Vec<serde_json::Value> = tasks
        .iter()
        .map(|t| serde_json::json!({ "description": t }))
        .collect();
    let mut payload = serde_json::json!({ "tasks": tasks });
    if let Some(info) = trip_info {
        payload["tripInfo"] = info;
    }
    TaskEvent::Artifact(Artifact::data("planner_result", payload))
}

// ── Resolver ────────────────────────────────────────────────────

/// Resolver that names each worker after the task it receives.
///
/// `resolve("Book hotel")` yields worker id `"Book hotel"`, so transports
/// can be scripted per task description. The planner is always `"planner"`.
#[derive(Debug, Default)]
pub struct StaticResolver {
    fail_with: Option<String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver whose every lookup fails.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
        }
    }

    fn lookup(&self, worker_id: &str) -> Result<WorkerRef> {
        match &self.fail_with {
            Some(message) => Err(TandemError::WorkerResolution(message.clone())),
            None => Ok(WorkerRef::new(worker_id, worker_id)),
        }
    }
}

impl WorkerResolver for StaticResolver {
    fn resolve(&self, task: &str) -> BoxFuture<'_, Result<WorkerRef>> {
        let result = self.lookup(task);
        Box::pin(async move { result })
    }

    fn resolve_planner(&self) -> BoxFuture<'_, Result<WorkerRef>> {
        let result = self.lookup(PLANNER);
        Box::pin(async move { result })
    }
}

// ── Transport ───────────────────────────────────────────────────

/// A call received by `RecordingTransport`.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub worker_id: String,
    pub task: String,
    pub task_id: Option<String>,
    pub context_id: Option<String>,
}

enum Reply {
    Events(Vec<TaskEvent>),
    /// Emit the events, then fail mid-stream.
    StreamError(Vec<TaskEvent>, String),
}

/// Transport with per-worker queues of scripted replies.
///
/// Every call is recorded. Calling a worker with no reply left fails with
/// a transport error.
#[derive(Default)]
pub struct RecordingTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the events for the next call to `worker_id`.
    pub fn reply(&self, worker_id: &str, events: Vec<TaskEvent>) {
        self.push(worker_id, Reply::Events(events));
    }

    /// Queue events followed by a mid-stream transport error.
    pub fn reply_then_fail(&self, worker_id: &str, events: Vec<TaskEvent>, message: &str) {
        self.push(worker_id, Reply::StreamError(events, message.to_string()));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Tasks sent to `worker_id`, in call order.
    pub fn tasks_for(&self, worker_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.worker_id == worker_id)
            .map(|c| c.task)
            .collect()
    }

    fn push(&self, worker_id: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(worker_id.to_string())
            .or_default()
            .push_back(reply);
    }
}

impl WorkerTransport for RecordingTransport {
    fn call(
        &self,
        worker: &WorkerRef,
        task: &str,
        task_id: Option<&str>,
        context_id: Option<&str>,
    ) -> BoxFuture<'_, Result<EventStream>> {
        self.calls.lock().unwrap().push(RecordedCall {
            worker_id: worker.worker_id.clone(),
            task: task.to_string(),
            task_id: task_id.map(str::to_string),
            context_id: context_id.map(str::to_string),
        });

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&worker.worker_id)
            .and_then(VecDeque::pop_front);
        let worker_id = worker.worker_id.clone();

        Box::pin(async move {
            let items: Vec<Result<TaskEvent>> = match reply {
                Some(Reply::Events(events)) => events.into_iter().map(Ok).collect(),
                Some(Reply::StreamError(events, message)) => events
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(TandemError::Transport {
                        worker: worker_id,
                        message,
                    })))
                    .collect(),
                None => {
                    return Err(TandemError::Transport {
                        worker: worker_id,
                        message: "no scripted reply".into(),
                    })
                }
            };
            Ok(futures::stream::iter(items).boxed())
        })
    }
}

// ── Summarizer ──────────────────────────────────────────────────

/// Summarizer returning fixed text and recording what it was given.
pub struct RecordingSummarizer {
    text: String,
    seen: Mutex<Vec<Vec<Artifact>>>,
}

impl RecordingSummarizer {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Result sets passed to each `summarize` call.
    pub fn seen(&self) -> Vec<Vec<Artifact>> {
        self.seen.lock().unwrap().clone()
    }
}

impl Summarizer for RecordingSummarizer {
    fn summarize(&self, results: &[Artifact]) -> BoxFuture<'_, Result<String>> {
        self.seen.lock().unwrap().push(results.to_vec());
        let text = self.text.clone();
        Box::pin(async move { Ok(text) })
    }
}
