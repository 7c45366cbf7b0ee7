//! Core data types shared across the engine: session/task identifiers, the
//! streaming `MessageChunk` and its accumulated `Message`, task records, and
//! token usage accounting.
//!
//! # Examples
//!
//! ```rust
//! use agent_orchestrator::{MessageChunk, MessageRole, MessageType};
//!
//! let chunk = MessageChunk::builder("msg-1", MessageRole::Assistant, MessageType::Normal)
//!     .content("Hello")
//!     .is_chunk(true)
//!     .build();
//!
//! assert_eq!(chunk.content, "Hello");
//! ```

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// SESSION ID / TASK ID
// ============================================================================

/// Opaque, non-empty identifier for a session.
///
/// Newtype over `String` so a session id can never be accidentally passed
/// where a task id (or an arbitrary string) is expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new session id, rejecting empty/whitespace-only strings.
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::invalid_argument("session_id must not be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionId::new(s)
    }
}

/// Opaque, non-empty identifier for a task within a session's task graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::invalid_argument("task_id must not be empty"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// MESSAGE ROLE / TYPE
// ============================================================================

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    System,
}

/// Semantic tag carried by every chunk/message, used by filter strategies to
/// decide which logical messages enter a given agent's prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAnalysis,
    Planning,
    Execution,
    Observation,
    Summary,
    ToolCall,
    ToolCallResult,
    Error,
    Normal,
    StageSummary,
    Thinking,
    Chunk,
    FinalAnswer,
    Guide,
}

// ============================================================================
// TOKEN USAGE
// ============================================================================

/// Token accounting attached to a terminal chunk. Every agent's terminal
/// chunk carries its own usage; the controller aggregates by summation
/// rather than relying on one final usage record for an entire multi-agent
/// run (see spec design note on concurrency-first token accounting).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Sum two usage records, combining optional fields when either is set.
    pub fn merge(&self, other: &TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
            cached_tokens: match (self.cached_tokens, other.cached_tokens) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
            },
            reasoning_tokens: match (self.reasoning_tokens, other.reasoning_tokens) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
            },
        }
    }
}

// ============================================================================
// TOOL CALL INTENT
// ============================================================================

/// One tool invocation intent carried on an assistant chunk/message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallIntent {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallIntent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

// ============================================================================
// TRACE INFO
// ============================================================================

/// Optional record emitted before any [`MessageChunk`] on a stream (spec.md
/// §6's response contract). Lets a caller correlate a stream with the
/// session/mode that produced it without inspecting the first chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceInfo {
    pub session_id: SessionId,
    pub mode: String,
    pub started_at_unix_ms: i64,
}

impl TraceInfo {
    pub fn new(session_id: SessionId, mode: impl Into<String>, started_at_unix_ms: i64) -> Self {
        Self {
            session_id,
            mode: mode.into(),
            started_at_unix_ms,
        }
    }
}

// ============================================================================
// MESSAGE CHUNK
// ============================================================================

/// The atomic unit of streaming. All chunks sharing a `message_id`
/// concatenate in arrival order to form one logical [`Message`], except
/// tool-result chunks, which replace rather than append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageChunk {
    pub message_id: String,
    pub role: MessageRole,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub session_id: SessionId,
    pub is_chunk: bool,
    pub is_final: bool,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_stats: Option<TokenUsage>,
}

impl MessageChunk {
    pub fn builder(
        message_id: impl Into<String>,
        role: MessageRole,
        message_type: MessageType,
    ) -> MessageChunkBuilder {
        MessageChunkBuilder::new(message_id, role, message_type)
    }

    /// A terminal chunk carrying a `cancelled` error, per spec §4.6/§8
    /// invariant 3: at most one more chunk after cancel, type=error,
    /// is_final=true.
    pub fn cancelled(session_id: SessionId, message_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            message_id: message_id.into(),
            role: MessageRole::Assistant,
            message_type: MessageType::Error,
            content: "cancelled".to_string(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            session_id,
            is_chunk: false,
            is_final: true,
            timestamp,
            usage_stats: None,
        }
    }
}

/// Builder for [`MessageChunk`], matching the fluent `AgentOptionsBuilder`
/// style used elsewhere in this crate.
pub struct MessageChunkBuilder {
    message_id: String,
    role: MessageRole,
    message_type: MessageType,
    content: String,
    tool_calls: Vec<ToolCallIntent>,
    tool_call_id: Option<String>,
    session_id: Option<SessionId>,
    is_chunk: bool,
    is_final: bool,
    timestamp: i64,
    usage_stats: Option<TokenUsage>,
}

impl MessageChunkBuilder {
    fn new(message_id: impl Into<String>, role: MessageRole, message_type: MessageType) -> Self {
        Self {
            message_id: message_id.into(),
            role,
            message_type,
            content: String::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            session_id: None,
            is_chunk: false,
            is_final: false,
            timestamp: 0,
            usage_stats: None,
        }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn tool_calls(mut self, tool_calls: Vec<ToolCallIntent>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    pub fn session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn is_chunk(mut self, is_chunk: bool) -> Self {
        self.is_chunk = is_chunk;
        self
    }

    pub fn is_final(mut self, is_final: bool) -> Self {
        self.is_final = is_final;
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn usage_stats(mut self, usage: TokenUsage) -> Self {
        self.usage_stats = Some(usage);
        self
    }

    pub fn build(self) -> MessageChunk {
        MessageChunk {
            message_id: self.message_id,
            role: self.role,
            message_type: self.message_type,
            content: self.content,
            tool_calls: self.tool_calls,
            tool_call_id: self.tool_call_id,
            session_id: self.session_id.unwrap_or_else(|| {
                SessionId::new("unknown").expect("literal is non-empty")
            }),
            is_chunk: self.is_chunk,
            is_final: self.is_final,
            timestamp: self.timestamp,
            usage_stats: self.usage_stats,
        }
    }
}

// ============================================================================
// MESSAGE (logical, accumulated)
// ============================================================================

/// The accumulation of all chunks sharing a `message_id`. This is the unit
/// stored by the message manager, filtered per agent, compressed to fit a
/// token budget, and ultimately sent to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub role: MessageRole,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub session_id: SessionId,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_stats: Option<TokenUsage>,
}

impl Message {
    /// Start a new logical message from its first chunk.
    pub fn from_first_chunk(chunk: &MessageChunk) -> Self {
        Self {
            message_id: chunk.message_id.clone(),
            role: chunk.role,
            message_type: chunk.message_type,
            content: chunk.content.clone(),
            tool_calls: chunk.tool_calls.clone(),
            tool_call_id: chunk.tool_call_id.clone(),
            session_id: chunk.session_id.clone(),
            timestamp: chunk.timestamp,
            usage_stats: chunk.usage_stats,
        }
    }

    /// Apply a subsequent chunk for this same `message_id`, per the merge
    /// rule in spec §4.3: tool-result chunks replace content verbatim;
    /// everything else appends.
    pub fn apply_chunk(&mut self, chunk: &MessageChunk) {
        if chunk.role == MessageRole::Tool {
            self.content = chunk.content.clone();
        } else {
            self.content.push_str(&chunk.content);
        }
        if !chunk.tool_calls.is_empty() {
            self.tool_calls = chunk.tool_calls.clone();
        }
        if chunk.tool_call_id.is_some() {
            self.tool_call_id = chunk.tool_call_id.clone();
        }
        if let Some(usage) = chunk.usage_stats {
            self.usage_stats = Some(usage);
        }
        self.timestamp = chunk.timestamp;
    }

    pub fn user(session_id: SessionId, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            message_id: format!("{}-user-{}", session_id, timestamp),
            role: MessageRole::User,
            message_type: MessageType::Normal,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            session_id,
            timestamp,
            usage_stats: None,
        }
    }

    pub fn system(session_id: SessionId, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            message_id: format!("{}-system-{}", session_id, timestamp),
            role: MessageRole::System,
            message_type: MessageType::Normal,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            session_id,
            timestamp,
            usage_stats: None,
        }
    }
}

// ============================================================================
// TASK
// ============================================================================

/// Lifecycle state of a [`Task`]. Transitions:
/// `pending -> in_progress -> (completed | failed)` or `pending -> skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// A dependency is satisfied once it reaches a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    /// Dependencies specifically in {completed, skipped} unblock dependents
    /// (a hard-failed dependency does not, unless explicitly wired "hard" —
    /// see [`crate::tasks::TaskManager`]).
    pub fn unblocks_dependents(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Skipped)
    }
}

/// A node in a session's dependency-ordered task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result_documents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtasks: Vec<Task>,
}

impl Task {
    pub fn new(task_id: TaskId, description: impl Into<String>, dependencies: Vec<TaskId>) -> Self {
        Self {
            task_id,
            description: description.into(),
            status: TaskStatus::Pending,
            dependencies,
            result_summary: None,
            result_documents: Vec::new(),
            start_time: None,
            end_time: None,
            subtasks: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> SessionId {
        SessionId::new("s1").unwrap()
    }

    #[test]
    fn test_session_id_rejects_empty() {
        assert!(SessionId::new("").is_err());
        assert!(SessionId::new("   ").is_err());
        assert!(SessionId::new("ok").is_ok());
    }

    #[test]
    fn test_message_chunk_builder() {
        let chunk = MessageChunk::builder("m1", MessageRole::Assistant, MessageType::Normal)
            .content("hi")
            .session_id(sid())
            .is_final(true)
            .build();
        assert_eq!(chunk.content, "hi");
        assert!(chunk.is_final);
        assert_eq!(chunk.session_id, sid());
    }

    #[test]
    fn test_message_apply_chunk_appends_text() {
        let c1 = MessageChunk::builder("m1", MessageRole::Assistant, MessageType::Normal)
            .content("Hello")
            .session_id(sid())
            .is_chunk(true)
            .build();
        let c2 = MessageChunk::builder("m1", MessageRole::Assistant, MessageType::Normal)
            .content(" world")
            .session_id(sid())
            .is_final(true)
            .build();

        let mut msg = Message::from_first_chunk(&c1);
        msg.apply_chunk(&c2);
        assert_eq!(msg.content, "Hello world");
    }

    #[test]
    fn test_message_apply_chunk_tool_result_replaces() {
        let c1 = MessageChunk::builder("m1", MessageRole::Tool, MessageType::ToolCallResult)
            .content("partial")
            .session_id(sid())
            .tool_call_id("call_1")
            .build();
        let c2 = MessageChunk::builder("m1", MessageRole::Tool, MessageType::ToolCallResult)
            .content("final result")
            .session_id(sid())
            .tool_call_id("call_1")
            .is_final(true)
            .build();

        let mut msg = Message::from_first_chunk(&c1);
        msg.apply_chunk(&c2);
        assert_eq!(msg.content, "final result");
    }

    #[test]
    fn test_task_status_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_task_status_unblocks_dependents() {
        assert!(TaskStatus::Completed.unblocks_dependents());
        assert!(TaskStatus::Skipped.unblocks_dependents());
        assert!(!TaskStatus::Failed.unblocks_dependents());
    }

    #[test]
    fn test_token_usage_merge() {
        let a = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            cached_tokens: Some(2),
            reasoning_tokens: None,
        };
        let b = TokenUsage {
            input_tokens: 3,
            output_tokens: 1,
            cached_tokens: None,
            reasoning_tokens: Some(4),
        };
        let merged = a.merge(&b);
        assert_eq!(merged.input_tokens, 13);
        assert_eq!(merged.output_tokens, 6);
        assert_eq!(merged.cached_tokens, Some(2));
        assert_eq!(merged.reasoning_tokens, Some(4));
        assert_eq!(merged.total(), 19);
    }

    #[test]
    fn test_message_type_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageType::TaskAnalysis).unwrap(),
            "\"task_analysis\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::FinalAnswer).unwrap(),
            "\"final_answer\""
        );
    }

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Tool).unwrap(),
            "\"tool\""
        );
    }

    #[test]
    fn test_cancelled_chunk() {
        let chunk = MessageChunk::cancelled(sid(), "m1", 1234);
        assert_eq!(chunk.message_type, MessageType::Error);
        assert!(chunk.is_final);
        assert_eq!(chunk.content, "cancelled");
    }
}
