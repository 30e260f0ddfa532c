use serde::Deserialize;
use tracing::debug;

use tandem_core::error::{Result, TandemError};
use tandem_core::types::{Artifact, Part};

/// One subtask discovered by the planner.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlannedTask {
    pub description: String,
}

/// Decoded payload of a planner-result artifact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Plan {
    /// Ordered subtasks; each becomes a node chained after the previous one.
    pub tasks: Vec<PlannedTask>,
    /// Structured trip data the planner gathered.
    #[serde(default, rename = "tripInfo", alias = "trip_info")]
    pub context: Option<serde_json::Value>,
}

impl Plan {
    /// Decode a plan from the first artifact part that carries one.
    ///
    /// Data parts are read as JSON directly; text parts are parsed as JSON.
    pub fn from_artifact(artifact: &Artifact) -> Result<Self> {
        if artifact.parts.is_empty() {
            return Err(TandemError::MalformedExpansion(format!(
                "artifact '{}' has no parts",
                artifact.name
            )));
        }

        let mut last_error = None;
        for part in &artifact.parts {
            let value = match part {
                Part::Data { data } => data.clone(),
                Part::Text { text } => match serde_json::from_str(text) {
                    Ok(value) => value,
                    Err(e) => {
                        debug!(error = %e, "Skipping non-JSON planner text part");
                        last_error = Some(e.to_string());
                        continue;
                    }
                },
            };

            match serde_json::from_value::<Plan>(value) {
                Ok(plan) => return Ok(plan),
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        Err(TandemError::MalformedExpansion(format!(
            "artifact '{}' has no valid task list: {}",
            artifact.name,
            last_error.unwrap_or_default()
        )))
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
