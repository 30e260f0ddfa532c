use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use tandem_core::error::{Result, TandemError};
use tandem_core::traits::{EventStream, WorkerTransport};
use tandem_core::types::{TaskEvent, WorkerRef};

/// Recorded worker responses, keyed by worker id.
///
/// Each entry is a queue of calls; each call is the list of events the
/// worker emits for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub workers: HashMap<String, Vec<Vec<TaskEvent>>>,
}

impl Script {
    /// Load a script from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// A call seen by the scripted transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedCall {
    pub worker_id: String,
    pub task: String,
    pub task_id: Option<String>,
    pub context_id: Option<String>,
}

/// Transport that replays a `Script` instead of calling remote workers.
pub struct ScriptedTransport {
    queues: Mutex<HashMap<String, VecDeque<Vec<TaskEvent>>>>,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedTransport {
    pub fn new(script: Script) -> Self {
        let queues = script
            .workers
            .into_iter()
            .map(|(worker, calls)| (worker, calls.into_iter().collect()))
            .collect();
        Self {
            queues: Mutex::new(queues),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Scripted calls not yet consumed for `worker_id`.
    pub fn remaining(&self, worker_id: &str) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(worker_id)
            .map_or(0, VecDeque::len)
    }
}

impl WorkerTransport for ScriptedTransport {
    fn call(
        &self,
        worker: &WorkerRef,
        task: &str,
        task_id: Option<&str>,
        context_id: Option<&str>,
    ) -> BoxFuture<'_, Result<EventStream>> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ScriptedCall {
                worker_id: worker.worker_id.clone(),
                task: task.to_string(),
                task_id: task_id.map(str::to_string),
                context_id: context_id.map(str::to_string),
            });

        let next = self
            .queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&worker.worker_id)
            .and_then(VecDeque::pop_front);
        let worker_id = worker.worker_id.clone();

        Box::pin(async move {
            let events = next.ok_or_else(|| TandemError::Transport {
                worker: worker_id.clone(),
                message: "script exhausted".into(),
            })?;
            debug!(worker = %worker_id, events = events.len(), "Replaying scripted call");
            Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed())
        })
    }
}
