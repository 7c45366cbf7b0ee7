//! # Agent Orchestrator
//!
//! The core orchestration engine for a multi-agent LLM framework: a
//! streaming LLM client, a tool manager that merges in-process, MCP
//! subprocess, and remote HTTP tools, a message manager that compresses
//! conversation history to fit a token budget, a dependency-ordered task
//! manager, a family of specialized agents, and a controller that runs them
//! through one of four modes.
//!
//! ## Architecture
//!
//! - **llm**: streaming chat completions over an OpenAI-compatible API
//!   (Component A).
//! - **tools**: in-process, MCP, and remote tool sources merged into one
//!   registry (Component B).
//! - **messages**: chunk accumulation, per-agent filtering, and
//!   token-budget compression (Component C).
//! - **tasks**: a per-session dependency-ordered task graph (Component D).
//! - **session**: the per-session bundle of messages, tasks, workspace, and
//!   cancellation (Component E).
//! - **agents**: the `Agent` trait and the specialized agents built on top
//!   of it (Component F).
//! - **controller**: session registry and mode dispatch (Component G).
//! - **flow**: the `custom` mode's caller-supplied agent sequence
//!   (Component H).
//! - **hooks**, **retry**, **config**, **error**: ambient concerns shared
//!   across every component above.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_orchestrator::{Controller, AgentDeps, Hooks};
//! use agent_orchestrator::tools::ToolManager;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let deps = AgentDeps {
//!         http_client: reqwest::Client::new(),
//!         base_url: "http://localhost:1234/v1".to_string(),
//!         api_key: String::new(),
//!         model: "qwen2.5-32b-instruct".to_string(),
//!         tool_manager: Arc::new(ToolManager::new(Duration::from_secs(120))),
//!         max_loop_count: 10,
//!         hooks: Hooks::default(),
//!     };
//!     let controller = Controller::new(deps, PathBuf::from("/tmp/sessions"), 8192);
//!     let session_id = "session-1".parse()?;
//!     let chunks = controller.run_stream(session_id, "What's 2+2?", "rapid").await?;
//!     for chunk in chunks {
//!         print!("{}", chunk.content);
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod hooks;
mod messages;
mod session;
mod tasks;
mod types;

pub mod agents;
pub mod controller;
pub mod flow;
pub mod llm;
pub mod retry;
pub mod tools;

// --- Provider Configuration ---

pub use config::{get_base_url, get_model, EngineConfig, McpSourceConfig, Provider, RemoteSourceConfig};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Lifecycle Hooks ---

pub use hooks::{
    HookDecision, Hooks, PostToolUseEvent, PreToolUseEvent, UserPromptSubmitEvent,
    HOOK_POST_TOOL_USE, HOOK_PRE_TOOL_USE, HOOK_USER_PROMPT_SUBMIT,
};

// --- Message Manager ---

pub use messages::{compress_to_budget, estimate_tokens, is_approaching_limit, FilterStrategy, MessageManager};

// --- Session Context ---

pub use session::SessionContext;

// --- Task Manager ---

pub use tasks::{TaskManager, TaskSnapshot};

// --- Core Types ---

pub use types::{
    Message, MessageChunk, MessageChunkBuilder, MessageRole, MessageType, SessionId, Task, TaskId,
    TaskStatus, TokenUsage, ToolCallIntent, TraceInfo,
};

// --- Agent Controller / Flow ---

pub use agents::AgentDeps;
pub use controller::{AgentSequenceFactory, Controller, ControllerOptions};
pub use flow::AgentFlow;

// --- Tool System ---

pub use tools::{tool, Tool, ToolBuilder};

// --- LLM Client ---

pub use llm::CancellationToken;

/// Convenience module containing the most commonly used types and
/// functions. Import with `use agent_orchestrator::prelude::*;`.
pub mod prelude {
    pub use crate::{
        tool, AgentDeps, AgentFlow, CancellationToken, Controller, ControllerOptions, Error,
        FilterStrategy, HookDecision, Hooks, Message, MessageChunk, MessageRole, MessageType,
        Result, SessionContext, SessionId, Task, TaskId, TaskStatus, Tool, TokenUsage, TraceInfo,
    };
}
