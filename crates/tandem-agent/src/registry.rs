use futures::future::BoxFuture;
use tracing::{debug, info};

use tandem_core::config::{AppConfig, WorkerConfig};
use tandem_core::error::{Result, TandemError};
use tandem_core::traits::WorkerResolver;
use tandem_core::types::WorkerRef;

/// Describes a worker's capabilities for routing decisions.
#[derive(Debug, Clone)]
pub struct WorkerCapability {
    /// Unique worker identifier.
    pub worker_id: String,
    /// Human-readable name.
    pub name: String,
    /// Where the transport reaches this worker.
    pub endpoint: Option<String>,
    /// Domain specializations (e.g., "flight", "hotel", "car rental").
    pub specializations: Vec<String>,
}

impl WorkerCapability {
    /// Create a new worker capability descriptor.
    pub fn new(worker_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            name: name.into(),
            endpoint: None,
            specializations: vec![],
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the specializations.
    pub fn with_specializations(mut self, specs: Vec<String>) -> Self {
        self.specializations = specs;
        self
    }

    /// Score how well this worker matches a task description.
    /// Higher score = better match.
    pub fn match_score(&self, task: &str) -> f64 {
        let task_lower = task.to_lowercase();
        self.specializations
            .iter()
            .filter(|spec| task_lower.contains(&spec.to_lowercase()))
            .count() as f64
            * 10.0
    }

    pub fn worker_ref(&self) -> WorkerRef {
        WorkerRef {
            worker_id: self.worker_id.clone(),
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl From<&WorkerConfig> for WorkerCapability {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            worker_id: config.worker_id.clone(),
            name: config
                .name
                .clone()
                .unwrap_or_else(|| config.worker_id.clone()),
            endpoint: config.endpoint.clone(),
            specializations: config.specializations.clone(),
        }
    }
}

/// Capability registry that resolves task descriptions to workers.
///
/// The planner is a fixed entry looked up by role, never by matching.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    workers: Vec<WorkerCapability>,
    planner: Option<WorkerCapability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the `[planner]` and `[[workers]]` sections.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();
        if let Some(planner) = &config.planner {
            registry.set_planner(WorkerCapability::from(planner));
        }
        for worker in &config.workers {
            registry.register(WorkerCapability::from(worker));
        }
        info!(
            workers = registry.workers.len(),
            planner = registry.planner.is_some(),
            "Capability registry loaded"
        );
        registry
    }

    /// Register a worker. Re-registering an id replaces the entry in place.
    pub fn register(&mut self, capability: WorkerCapability) {
        match self
            .workers
            .iter_mut()
            .find(|w| w.worker_id == capability.worker_id)
        {
            Some(existing) => *existing = capability,
            None => self.workers.push(capability),
        }
    }

    /// Unregister a worker.
    pub fn unregister(&mut self, worker_id: &str) -> Option<WorkerCapability> {
        let pos = self.workers.iter().position(|w| w.worker_id == worker_id)?;
        Some(self.workers.remove(pos))
    }

    pub fn set_planner(&mut self, planner: WorkerCapability) {
        self.planner = Some(planner);
    }

    /// List all registered workers in registration order.
    pub fn workers(&self) -> &[WorkerCapability] {
        &self.workers
    }

    /// Find the best worker for a task.
    ///
    /// Ties, including all-zero scores, go to the earliest registration.
    /// Returns None if no workers are registered.
    pub fn route(&self, task: &str) -> Option<&WorkerCapability> {
        let mut best: Option<(&WorkerCapability, f64)> = None;
        for worker in &self.workers {
            let score = worker.match_score(task);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((worker, score));
            }
        }
        best.map(|(worker, _)| worker)
    }
}

impl WorkerResolver for CapabilityRegistry {
    fn resolve(&self, task: &str) -> BoxFuture<'_, Result<WorkerRef>> {
        let routed = self.route(task).map(WorkerCapability::worker_ref);
        let task = task.to_string();
        Box::pin(async move {
            let worker = routed.ok_or_else(|| {
                TandemError::WorkerResolution(format!("No worker registered for task '{}'", task))
            })?;
            debug!(worker = %worker.worker_id, task = %task, "Routing task to worker");
            Ok(worker)
        })
    }

    fn resolve_planner(&self) -> BoxFuture<'_, Result<WorkerRef>> {
        Box::pin(async move {
            self.planner
                .as_ref()
                .map(WorkerCapability::worker_ref)
                .ok_or_else(|| TandemError::WorkerResolution("No planner configured".into()))
        })
    }
}
