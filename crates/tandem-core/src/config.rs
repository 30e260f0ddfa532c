use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TandemError};

/// Top-level Tandem configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub planner: Option<WorkerConfig>,
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
    #[serde(default)]
    pub events: EventsConfig,
}

/// How `run` treats a start id that is not in the graph.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnknownStart {
    /// Fall back to every node without incoming edges.
    #[default]
    AllRoots,
    /// Fail with a configuration error.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Node key that routes to the planner worker.
    #[serde(default = "default_planner_key")]
    pub planner_key: String,
    /// Artifact name that carries a planner result.
    #[serde(default = "default_planner_artifact")]
    pub planner_artifact: String,
    /// Artifact name of the final session summary.
    #[serde(default = "default_summary_artifact")]
    pub summary_artifact: String,
    #[serde(default)]
    pub unknown_start: UnknownStart,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            planner_key: default_planner_key(),
            planner_artifact: default_planner_artifact(),
            summary_artifact: default_summary_artifact(),
            unknown_start: UnknownStart::default(),
        }
    }
}

fn default_planner_key() -> String {
    "planner".to_string()
}

fn default_planner_artifact() -> String {
    "planner_result".to_string()
}

fn default_summary_artifact() -> String {
    "summary".to_string()
}

/// A worker the registry can route to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Domain keywords matched against task descriptions.
    #[serde(default)]
    pub specializations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_event_capacity() -> usize {
    256
}

impl AppConfig {
    /// Load a TOML config file. `${NAME}` references are expanded from the
    /// environment before parsing.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| TandemError::ConfigNotFound(path.display().to_string()))?;
        toml::from_str(&expand_env_vars(&raw))
            .map_err(|e| TandemError::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Replace `${NAME}` with the value of environment variable `NAME`.
///
/// Unset variables and an unterminated `${` are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let reference = &rest[open..];
        let Some(close) = reference.find('}') else {
            rest = reference;
            break;
        };
        match std::env::var(&reference[2..close]) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(&reference[..=close]),
        }
        rest = &reference[close + 1..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TANDEM_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_TANDEM_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_TANDEM_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_TANDEM_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_TANDEM_VAR}\"");
    }

    #[test]
    fn test_expand_env_vars_unterminated() {
        std::env::set_var("TEST_TANDEM_HOST", "localhost");
        let result = expand_env_vars("a = \"${TEST_TANDEM_HOST}\"\nb = \"${BROKEN");
        assert_eq!(result, "a = \"localhost\"\nb = \"${BROKEN");
        std::env::remove_var("TEST_TANDEM_HOST");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.workflow.planner_key, "planner");
        assert_eq!(config.workflow.planner_artifact, "planner_result");
        assert_eq!(config.workflow.summary_artifact, "summary");
        assert_eq!(config.workflow.unknown_start, UnknownStart::AllRoots);
        assert!(config.planner.is_none());
        assert!(config.workers.is_empty());
        assert_eq!(config.events.capacity, 256);
    }

    #[test]
    fn test_workers_and_strict_start() {
        let toml_str = r#"
[workflow]
unknown_start = "reject"

[planner]
worker_id = "planner"
endpoint = "http://localhost:10101"

[[workers]]
worker_id = "air"
name = "Air Ticketing Agent"
specializations = ["flight", "airline"]

[[workers]]
worker_id = "hotel"
specializations = ["hotel", "accommodation"]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.workflow.unknown_start, UnknownStart::Reject);
        let planner = config.planner.unwrap();
        assert_eq!(planner.endpoint.as_deref(), Some("http://localhost:10101"));
        assert_eq!(config.workers.len(), 2);
        assert_eq!(config.workers[0].name.as_deref(), Some("Air Ticketing Agent"));
        assert!(config.workers[1].name.is_none());
        assert_eq!(config.workers[1].specializations, vec!["hotel", "accommodation"]);
    }
}
