//! Error types for the agent orchestration engine

use crate::types::{SessionId, TaskId};
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    /// Bad request payload or tool arguments
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Agent requested a tool that is not registered
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// A tool invocation exceeded its timeout
    #[error("tool timed out: {0}")]
    ToolTimeout(String),

    /// A tool invocation failed
    #[error("tool failed: {0}")]
    ToolFailed(String),

    /// LLM call failed after exhausting retries
    #[error("LLM transport error: {0}")]
    LlmTransport(#[from] reqwest::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `max_loop_count` reached without convergence
    #[error("loop exhausted after {max_loop_count} iterations")]
    LoopExhausted { max_loop_count: u32 },

    /// The session was cancelled
    #[error("session cancelled")]
    Cancelled,

    /// Concurrent use of the same session id was rejected at entry
    #[error("session busy: {0}")]
    SessionBusy(SessionId),

    /// No session exists for the given id
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// A referenced task does not exist
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem/workspace I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other/uncategorized errors
    #[error("error: {0}")]
    Other(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Error::ToolNotFound(name.into())
    }

    pub fn tool_timeout(name: impl Into<String>) -> Self {
        Error::ToolTimeout(name.into())
    }

    pub fn tool_failed(msg: impl Into<String>) -> Self {
        Error::ToolFailed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// The error "kind" string used in wire-level error chunks (spec §7).
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::ToolNotFound(_) => "tool_not_found",
            Error::ToolTimeout(_) => "tool_timeout",
            Error::ToolFailed(_) => "tool_failed",
            Error::LlmTransport(_) => "llm_transport",
            Error::Json(_) => "llm_transport",
            Error::LoopExhausted { .. } => "loop_exhausted",
            Error::Cancelled => "cancelled",
            Error::SessionBusy(_) => "session_busy",
            Error::SessionNotFound(_) => "invalid_argument",
            Error::TaskNotFound(_) => "invalid_argument",
            Error::Config(_) => "invalid_argument",
            Error::Io(_) => "tool_failed",
            Error::Other(_) => "tool_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(Error::invalid_argument("x").kind(), "invalid_argument");
        assert_eq!(Error::tool_not_found("calc").kind(), "tool_not_found");
        assert_eq!(Error::Cancelled.kind(), "cancelled");
        assert_eq!(
            Error::LoopExhausted { max_loop_count: 5 }.kind(),
            "loop_exhausted"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::tool_failed("boom");
        assert_eq!(err.to_string(), "tool failed: boom");
    }

    #[test]
    fn test_session_busy_display() {
        let id = SessionId::new("s1").unwrap();
        let err = Error::SessionBusy(id);
        assert!(err.to_string().contains("s1"));
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
