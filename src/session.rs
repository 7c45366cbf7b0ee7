//! Session Context (Component E): the per-session bundle an agent run
//! operates on — a message manager, a task manager, a sandboxed workspace,
//! and a cancellation token.

use crate::llm::CancellationToken;
use crate::messages::MessageManager;
use crate::tasks::TaskManager;
use crate::tools::resolve_sandboxed;
use crate::types::SessionId;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything one running session owns. Shared via `Arc` between the
/// controller and the agents it dispatches to; agent-as-tool recursion gets
/// its own child context with an isolated workspace subdirectory.
pub struct SessionContext {
    session_id: SessionId,
    workspace_root: PathBuf,
    message_manager: MessageManager,
    task_manager: TaskManager,
    cancel: CancellationToken,
    /// Free-form scratch state written by agents (e.g. TaskDecompose's
    /// `task_decomposition_results`).
    audit_status: HashMap<String, Value>,
    context_token_budget: usize,
    /// Allow-list of tool names an agent's LLM prompt may see (spec.md
    /// §4.2's `available_tools`). `None` means every registered tool.
    available_tools: Option<Vec<String>>,
}

impl SessionContext {
    pub fn new(session_id: SessionId, workspace_root: PathBuf, context_token_budget: usize) -> Self {
        Self {
            message_manager: MessageManager::new(workspace_root.clone()),
            task_manager: TaskManager::new(workspace_root.clone()),
            workspace_root,
            session_id,
            cancel: CancellationToken::new(),
            audit_status: HashMap::new(),
            context_token_budget,
            available_tools: None,
        }
    }

    pub async fn load(session_id: SessionId, workspace_root: PathBuf, context_token_budget: usize) -> Result<Self> {
        let message_manager = MessageManager::load(workspace_root.clone()).await?;
        let task_manager = TaskManager::load(workspace_root.clone()).await?;
        Ok(Self {
            message_manager,
            task_manager,
            workspace_root,
            session_id,
            cancel: CancellationToken::new(),
            audit_status: HashMap::new(),
            context_token_budget,
            available_tools: None,
        })
    }

    fn from_parts(
        session_id: SessionId,
        workspace_root: PathBuf,
        cancel: CancellationToken,
        context_token_budget: usize,
        available_tools: Option<Vec<String>>,
    ) -> Self {
        Self {
            message_manager: MessageManager::new(workspace_root.clone()),
            task_manager: TaskManager::new(workspace_root.clone()),
            workspace_root,
            session_id,
            cancel,
            audit_status: HashMap::new(),
            context_token_budget,
            available_tools,
        }
    }

    /// A transient sub-session for agent-as-tool recursion: isolated
    /// workspace subdirectory, own message/task managers, but a
    /// cancellation token that observes the parent's.
    pub fn child_of(&self, child_session_id: SessionId) -> Self {
        let child_root = self.workspace_root.join("children").join(child_session_id.as_str());
        Self::from_parts(
            child_session_id,
            child_root,
            self.cancel.child(),
            self.context_token_budget,
            self.available_tools.clone(),
        )
    }

    /// A cheap, owned, `'static` view of this session, handed to tool
    /// handlers through [`crate::tools::ToolManager::call`] so they can
    /// spawn a child session or resolve sandboxed paths without holding a
    /// live borrow of `SessionContext` across an `.await`.
    pub fn call_context(&self) -> ToolCallContext {
        ToolCallContext {
            session_id: self.session_id.clone(),
            workspace_root: self.workspace_root.clone(),
            cancel: self.cancel.child(),
            context_token_budget: self.context_token_budget,
            available_tools: self.available_tools.clone(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn context_token_budget(&self) -> usize {
        self.context_token_budget
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn messages(&self) -> &MessageManager {
        &self.message_manager
    }

    pub fn messages_mut(&mut self) -> &mut MessageManager {
        &mut self.message_manager
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.task_manager
    }

    pub fn tasks_mut(&mut self) -> &mut TaskManager {
        &mut self.task_manager
    }

    pub fn set_audit(&mut self, key: impl Into<String>, value: Value) {
        self.audit_status.insert(key.into(), value);
    }

    pub fn get_audit(&self, key: &str) -> Option<&Value> {
        self.audit_status.get(key)
    }

    /// Restrict which registered tools this session's agents may see, per
    /// the wire request's `available_tools` field. `None` clears the
    /// restriction.
    pub fn set_available_tools(&mut self, tools: Option<Vec<String>>) {
        self.available_tools = tools;
    }

    pub fn available_tools(&self) -> Option<&[String]> {
        self.available_tools.as_deref()
    }

    /// Resolve a path request against this session's sandboxed workspace.
    pub fn resolve_path(&self, requested: &str) -> Result<PathBuf> {
        resolve_sandboxed(&self.workspace_root, requested)
    }

    pub async fn persist(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.workspace_root).await?;
        self.message_manager.persist().await?;
        self.task_manager.persist().await?;
        Ok(())
    }
}

/// Owned view of a [`SessionContext`] handed to tool handlers that need to
/// spawn a child session (agent-as-tool recursion, see
/// [`crate::agents::Agent::to_tool`]) or resolve sandboxed paths, but can't
/// hold a live `&SessionContext` borrow across the handler's `.await`.
#[derive(Clone)]
pub struct ToolCallContext {
    session_id: SessionId,
    workspace_root: PathBuf,
    cancel: CancellationToken,
    context_token_budget: usize,
    available_tools: Option<Vec<String>>,
}

impl ToolCallContext {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolve a path request against the calling session's sandboxed
    /// workspace (spec.md §4.2's filesystem-tool security clause).
    pub fn resolve_path(&self, requested: &str) -> Result<PathBuf> {
        resolve_sandboxed(&self.workspace_root, requested)
    }

    /// Build a child [`SessionContext`] nested under this session's
    /// workspace, sharing its cancellation — the same shape
    /// `SessionContext::child_of` produces, usable from a handler that only
    /// has this owned view rather than a live parent reference.
    pub fn child_session(&self, child_session_id: SessionId) -> SessionContext {
        let child_root = self.workspace_root.join("children").join(child_session_id.as_str());
        SessionContext::from_parts(
            child_session_id,
            child_root,
            self.cancel.child(),
            self.context_token_budget,
            self.available_tools.clone(),
        )
    }
}
