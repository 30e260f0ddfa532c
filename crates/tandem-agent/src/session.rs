use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_stream::try_stream;
use futures::{pin_mut, Stream, StreamExt};
use tracing::debug;

use tandem_core::config::WorkflowConfig;
use tandem_core::error::Result;
use tandem_core::event::EventBus;
use tandem_core::traits::Summarizer;
use tandem_core::types::TaskEvent;

use crate::graph::Workers;
use crate::orchestrator::Orchestrator;

struct SessionInfo {
    orchestrator: Arc<tokio::sync::Mutex<Orchestrator>>,
    started_at: chrono::DateTime<chrono::Utc>,
    last_active: chrono::DateTime<chrono::Utc>,
}

/// Session manager giving each external context its own orchestrator.
///
/// Calls for the same context are serialized; different contexts never
/// share a graph. Sessions stay registered until `remove` or `evict_idle`
/// drops them.
pub struct SessionManager {
    workers: Workers,
    summarizer: Arc<dyn Summarizer>,
    settings: WorkflowConfig,
    events: Option<Arc<EventBus>>,
    sessions: Mutex<HashMap<String, SessionInfo>>,
}

impl SessionManager {
    pub fn new(workers: Workers, summarizer: Arc<dyn Summarizer>, settings: WorkflowConfig) -> Self {
        Self {
            workers,
            summarizer,
            settings,
            events: None,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Publish lifecycle events from every session on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Get or create the orchestrator for a context id.
    pub fn orchestrator(&self, context_id: &str) -> Arc<tokio::sync::Mutex<Orchestrator>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let now = chrono::Utc::now();
        if let Some(info) = sessions.get_mut(context_id) {
            info.last_active = now;
            return info.orchestrator.clone();
        }

        debug!(session = %context_id, "Creating session orchestrator");
        let mut orchestrator = Orchestrator::new(
            self.workers.clone(),
            self.summarizer.clone(),
            self.settings.clone(),
        );
        if let Some(bus) = &self.events {
            orchestrator = orchestrator.with_event_bus(bus.clone());
        }
        let orchestrator = Arc::new(tokio::sync::Mutex::new(orchestrator));
        sessions.insert(
            context_id.to_string(),
            SessionInfo {
                orchestrator: orchestrator.clone(),
                started_at: now,
                last_active: now,
            },
        );
        orchestrator
    }

    /// Handle one external call, routed to the session for `context_id`.
    pub fn handle(
        &self,
        query: String,
        task_id: String,
        context_id: String,
    ) -> impl Stream<Item = Result<TaskEvent>> + Send + 'static {
        let session = self.orchestrator(&context_id);
        try_stream! {
            let mut orchestrator = session.lock_owned().await;
            let events = orchestrator.handle(&query, &task_id, &context_id);
            pin_mut!(events);
            while let Some(event) = events.next().await {
                yield event?;
            }
        }
    }

    /// Forget a session. Returns whether it existed.
    pub fn remove(&self, context_id: &str) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(context_id)
            .is_some()
    }

    /// Drop sessions unused for at least `max_idle`. Sessions with a call in
    /// progress are kept. Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: chrono::Duration) -> usize {
        let now = chrono::Utc::now();
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|context_id, info| {
            let idle = now - info.last_active >= max_idle;
            let busy = info.orchestrator.try_lock().is_err();
            if idle && !busy {
                debug!(session = %context_id, "Evicting idle session");
                return false;
            }
            true
        });
        before - sessions.len()
    }

    /// List active session keys.
    pub fn sessions(&self) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// When a session was created and last used.
    pub fn activity(
        &self,
        context_id: &str,
    ) -> Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(context_id)
            .map(|info| (info.started_at, info.last_active))
    }
}
