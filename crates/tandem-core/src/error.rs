use thiserror::Error;

#[derive(Debug, Error)]
pub enum TandemError {
    // Graph errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    // External call errors
    #[error("Worker resolution failed: {0}")]
    WorkerResolution(String),

    #[error("Transport error: {worker}: {message}")]
    Transport { worker: String, message: String },

    // Planner errors
    #[error("Malformed planner result: {0}")]
    MalformedExpansion(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TandemError {
    /// Whether this error came from a worker lookup or a remote call.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            TandemError::WorkerResolution(_) | TandemError::Transport { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TandemError>;
