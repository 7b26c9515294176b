//! Error types for the orchestration core

use thiserror::Error;

/// Result type alias for the orchestration core
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Main error type for the orchestration core
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Malformed request; rejected before any side effect
    #[error("validation error: {message}")]
    Validation { message: String },

    /// No session with the given id
    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    /// Session exists but has passed the idle timeout
    #[error("session expired: {id}")]
    SessionExpired { id: String },

    /// Registry is full and no idle session can be evicted
    #[error("session capacity reached: {max} sessions")]
    Capacity { max: usize },

    /// A second turn was submitted while the session was running
    #[error("session {id} already has a turn in progress")]
    ConcurrentTurn { id: String },

    /// Agent requested a tool outside its declared capability set
    #[error("agent '{agent}' is not permitted to call tool '{tool}'")]
    CapabilityViolation { agent: String, tool: String },

    /// Agent requested a transition with no declared edge
    #[error("illegal handoff from '{from}' to '{to}'")]
    HandoffViolation { from: String, to: String },

    /// External tool failed after the fallback attempt
    #[error("tool '{tool}' failed: {message}")]
    ToolInvocation { tool: String, message: String },

    /// Turn exceeded the configured hop bound
    #[error("turn exceeded {max} agent iterations")]
    IterationLimitExceeded { max: usize },

    /// Invalid graph or tool registration; aborts startup
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The agent-response capability failed
    #[error("provider error: {message}")]
    Provider { message: String },

    /// Error from the OpenAI API
    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error from a tool adapter
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwarmError {
    /// Stable kind string carried by the wire `error` event.
    pub fn kind(&self) -> &'static str {
        match self {
            SwarmError::Validation { .. } => "validation_error",
            SwarmError::SessionNotFound { .. } => "session_not_found",
            SwarmError::SessionExpired { .. } => "session_expired",
            SwarmError::Capacity { .. } => "capacity_error",
            SwarmError::ConcurrentTurn { .. } => "concurrent_turn",
            SwarmError::CapabilityViolation { .. } => "capability_violation",
            SwarmError::HandoffViolation { .. } => "handoff_violation",
            SwarmError::ToolInvocation { .. } => "tool_invocation_error",
            SwarmError::IterationLimitExceeded { .. } => "iteration_limit_exceeded",
            SwarmError::Configuration { .. } => "configuration_error",
            SwarmError::Provider { .. } | SwarmError::OpenAI(_) => "provider_error",
            SwarmError::Serialization(_) => "serialization_error",
            SwarmError::Http(_) => "http_error",
            SwarmError::Io(_) => "io_error",
        }
    }

    /// Whether the error terminates only the turn, leaving the process healthy.
    pub fn is_turn_fatal(&self) -> bool {
        matches!(
            self,
            SwarmError::CapabilityViolation { .. }
                | SwarmError::HandoffViolation { .. }
                | SwarmError::ToolInvocation { .. }
                | SwarmError::IterationLimitExceeded { .. }
                | SwarmError::Provider { .. }
                | SwarmError::OpenAI(_)
        )
    }
}
