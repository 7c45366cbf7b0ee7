//! Hooks: intercepting and controlling agent execution at key lifecycle
//! points. Every event now carries the session and agent it originated
//! from, since one controller run can span many agents and sub-sessions.

use crate::types::SessionId;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Event fired before a tool is executed.
#[derive(Debug, Clone)]
pub struct PreToolUseEvent {
    pub session_id: SessionId,
    pub agent_name: &'static str,
    pub tool_name: String,
    pub tool_input: Value,
    pub tool_use_id: String,
}

impl PreToolUseEvent {
    pub fn new(
        session_id: SessionId,
        agent_name: &'static str,
        tool_name: String,
        tool_input: Value,
        tool_use_id: String,
    ) -> Self {
        Self {
            session_id,
            agent_name,
            tool_name,
            tool_input,
            tool_use_id,
        }
    }
}

/// Event fired after a tool returns (success or failure).
#[derive(Debug, Clone)]
pub struct PostToolUseEvent {
    pub session_id: SessionId,
    pub agent_name: &'static str,
    pub tool_name: String,
    pub tool_input: Value,
    pub tool_use_id: String,
    pub tool_result: Value,
}

impl PostToolUseEvent {
    pub fn new(
        session_id: SessionId,
        agent_name: &'static str,
        tool_name: String,
        tool_input: Value,
        tool_use_id: String,
        tool_result: Value,
    ) -> Self {
        Self {
            session_id,
            agent_name,
            tool_name,
            tool_input,
            tool_use_id,
            tool_result,
        }
    }
}

/// Event fired before a user turn is appended to a session.
#[derive(Debug, Clone)]
pub struct UserPromptSubmitEvent {
    pub session_id: SessionId,
    pub prompt: String,
}

impl UserPromptSubmitEvent {
    pub fn new(session_id: SessionId, prompt: String) -> Self {
        Self { session_id, prompt }
    }
}

/// Decision returned by a hook handler to control execution.
#[derive(Debug, Clone, Default)]
pub struct HookDecision {
    pub continue_execution: bool,
    pub modified_input: Option<Value>,
    pub modified_prompt: Option<String>,
    pub reason: Option<String>,
}

impl HookDecision {
    pub fn continue_() -> Self {
        Self {
            continue_execution: true,
            modified_input: None,
            modified_prompt: None,
            reason: None,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            continue_execution: false,
            modified_input: None,
            modified_prompt: None,
            reason: Some(reason.into()),
        }
    }

    pub fn modify_input(input: Value, reason: impl Into<String>) -> Self {
        Self {
            continue_execution: true,
            modified_input: Some(input),
            modified_prompt: None,
            reason: Some(reason.into()),
        }
    }

    pub fn modify_prompt(prompt: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            continue_execution: true,
            modified_input: None,
            modified_prompt: Some(prompt.into()),
            reason: Some(reason.into()),
        }
    }
}

pub type PreToolUseHandler = Arc<
    dyn Fn(PreToolUseEvent) -> Pin<Box<dyn Future<Output = Option<HookDecision>> + Send>>
        + Send
        + Sync,
>;

pub type PostToolUseHandler = Arc<
    dyn Fn(PostToolUseEvent) -> Pin<Box<dyn Future<Output = Option<HookDecision>> + Send>>
        + Send
        + Sync,
>;

pub type UserPromptSubmitHandler = Arc<
    dyn Fn(UserPromptSubmitEvent) -> Pin<Box<dyn Future<Output = Option<HookDecision>> + Send>>
        + Send
        + Sync,
>;

/// Container for all hook types, threaded through a [`crate::controller::Controller`].
#[derive(Clone, Default)]
pub struct Hooks {
    pub pre_tool_use: Vec<PreToolUseHandler>,
    pub post_tool_use: Vec<PostToolUseHandler>,
    pub user_prompt_submit: Vec<UserPromptSubmitHandler>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre_tool_use<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(PreToolUseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HookDecision>> + Send + 'static,
    {
        self.pre_tool_use
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub fn add_post_tool_use<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(PostToolUseEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HookDecision>> + Send + 'static,
    {
        self.post_tool_use
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    pub fn add_user_prompt_submit<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(UserPromptSubmitEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HookDecision>> + Send + 'static,
    {
        self.user_prompt_submit
            .push(Arc::new(move |event| Box::pin(handler(event))));
        self
    }

    /// Run every registered PreToolUse hook and return the first non-None
    /// decision, short-circuiting on it.
    pub async fn execute_pre_tool_use(&self, event: PreToolUseEvent) -> Option<HookDecision> {
        for handler in &self.pre_tool_use {
            if let Some(decision) = handler(event.clone()).await {
                return Some(decision);
            }
        }
        None
    }

    pub async fn execute_post_tool_use(&self, event: PostToolUseEvent) -> Option<HookDecision> {
        for handler in &self.post_tool_use {
            if let Some(decision) = handler(event.clone()).await {
                return Some(decision);
            }
        }
        None
    }

    pub async fn execute_user_prompt_submit(
        &self,
        event: UserPromptSubmitEvent,
    ) -> Option<HookDecision> {
        for handler in &self.user_prompt_submit {
            if let Some(decision) = handler(event.clone()).await {
                return Some(decision);
            }
        }
        None
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_tool_use", &format!("{} handlers", self.pre_tool_use.len()))
            .field("post_tool_use", &format!("{} handlers", self.post_tool_use.len()))
            .field(
                "user_prompt_submit",
                &format!("{} handlers", self.user_prompt_submit.len()),
            )
            .finish()
    }
}

pub const HOOK_PRE_TOOL_USE: &str = "pre_tool_use";
pub const HOOK_POST_TOOL_USE: &str = "post_tool_use";
pub const HOOK_USER_PROMPT_SUBMIT: &str = "user_prompt_submit";
