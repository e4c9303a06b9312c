use thiserror::Error;

/// Everything the engine can report back to a caller.
///
/// Each variant maps to a stable `code()` that travels in the failure envelope,
/// so clients can branch without parsing the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid arguments: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("tool '{name}' has an invalid parameter schema: {message}")]
    InvalidSchema { name: String, message: String },

    #[error("plan run '{0}' does not exist")]
    UnknownRun(String),

    #[error("plan run '{0}' is already being resumed")]
    RunAlreadyActive(String),

    #[error("{0}")]
    Handler(String),

    #[error("{message}")]
    Step { step: String, message: String },

    #[error("run store failure: {0}")]
    Store(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::DuplicateTool(_) => "duplicate_tool",
            EngineError::InvalidSchema { .. } => "invalid_schema",
            EngineError::UnknownRun(_) => "unknown_run",
            EngineError::RunAlreadyActive(_) => "run_already_active",
            EngineError::Handler(_) => "handler_error",
            EngineError::Step { .. } => "step_error",
            EngineError::Store(_) => "store_error",
        }
    }

    /// Wraps a handler failure, keeping the full cause chain as the message.
    pub fn handler(err: anyhow::Error) -> Self {
        EngineError::Handler(format!("{:#}", err))
    }
}

/// Failures reported by a [`crate::store::RunStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run '{0}' not found")]
    Unknown(String),

    #[error("run '{0}' is leased by another resume")]
    Busy(String),

    #[error("failed to encode run state: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unknown(id) => EngineError::UnknownRun(id),
            StoreError::Busy(id) => EngineError::RunAlreadyActive(id),
            other => EngineError::Store(other.to_string()),
        }
    }
}

/// Failures raised by [`crate::client::ToolClient`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with `ok: false`; the message is its error text verbatim.
    #[error("{message}")]
    Remote { code: Option<String>, message: String },

    #[error("server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("invalid call arguments: {0}")]
    InvalidArguments(String),
}

/// Bad or unparsable environment configuration.
#[derive(Debug, Error)]
#[error("invalid value for {key}: {message}")]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}
