//! Error types for the sandbox tool bridge
//!
//! One `thiserror` hierarchy shared by every crate in the workspace so that
//! transport, schema, correlation and decode failures can be told apart by the
//! caller that decides whether a run is aborted.

use thiserror::Error;

/// Main error type for the sandbox tool bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The sandbox answered with a non-success HTTP status
    #[error("Sandbox {operation} failed with status {status}: {body}")]
    Transport {
        operation: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(String),

    /// A tool schema could not be turned into sandbox types
    #[error("Schema error in tool '{tool}': {message}")]
    Schema { tool: String, message: String },

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Tool registration error
    #[error("Tool registration error: {0}")]
    ToolRegistration(String),

    /// Relay output was neither a call batch nor a final result
    #[error("Relay decode error: {message}")]
    Decode { message: String, raw: String },

    /// Invalid argument provided to a function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not allowed in the current session state
    #[error("Session state error: {0}")]
    SessionState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Code generation failed
    #[error("Code generation error: {0}")]
    Codegen(String),

    /// Run event stream error
    #[error("Stream error: {0}")]
    Stream(String),

    /// The run was cancelled between relay iterations
    #[error("Run cancelled after {iterations} relay iterations")]
    Cancelled { iterations: usize },

    /// I/O error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn schema(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Stable machine-readable kind, used when an error is shipped back into the sandbox.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Transport { .. } => "transport",
            BridgeError::Http(_) => "http",
            BridgeError::Schema { .. } => "schema",
            BridgeError::ToolNotFound(_) => "tool_not_found",
            BridgeError::ToolExecution(_) => "tool_execution",
            BridgeError::ToolRegistration(_) => "tool_registration",
            BridgeError::Decode { .. } => "decode",
            BridgeError::InvalidArgument(_) => "invalid_argument",
            BridgeError::SessionState(_) => "session_state",
            BridgeError::Configuration(_) => "configuration",
            BridgeError::Codegen(_) => "codegen",
            BridgeError::Stream(_) => "stream",
            BridgeError::Cancelled { .. } => "cancelled",
            BridgeError::Io(_) => "io",
            BridgeError::Json(_) => "json",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BridgeError>;
