//! Agent Base (Component F): the shared contract every specialized agent
//! implements, plus the two pieces of machinery every agent is built from —
//! a streaming LLM call against a filtered message window, and a
//! tool-execution loop that feeds tool results back until the model stops
//! requesting tools or `max_loop_count` is hit.

mod common;
mod executor;
mod observation;
mod planning;
mod react;
mod simple;
mod summary;
mod task_analysis;
mod task_decompose;
mod task_router;

pub use common::CommonAgent;
pub use executor::ExecutorAgent;
pub use observation::ObservationAgent;
pub use planning::PlanningAgent;
pub use react::ReactAgent;
pub use simple::SimpleAgent;
pub use summary::SummaryAgent;
pub use task_analysis::TaskAnalysisAgent;
pub use task_decompose::TaskDecomposeAgent;
pub use task_router::TaskRouterAgent;

use crate::hooks::{Hooks, PostToolUseEvent, PreToolUseEvent};
use crate::llm::{self, ChatDelta, ChatRequest, OpenAIMessage};
use crate::messages::FilterStrategy;
use crate::session::SessionContext;
use crate::tools::{Tool, ToolManager};
use crate::types::{Message, MessageChunk, MessageRole, MessageType, SessionId, TokenUsage, ToolCallIntent};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Shared configuration every agent needs to reach the LLM and the tool
/// registry. Cheap to clone: the heavy parts are already behind `Arc`/
/// `reqwest::Client`'s internal `Arc`.
#[derive(Clone)]
pub struct AgentDeps {
    pub http_client: reqwest::Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub tool_manager: Arc<ToolManager>,
    pub max_loop_count: u32,
    /// Pre/post-tool-call interception (spec.md §2 "generalized to pre/post
    /// tool-call and pre-agent-turn interception"). Empty by default — no
    /// handlers registered means every call passes through unmodified.
    pub hooks: Hooks,
}

/// The contract every specialized agent satisfies. A mode (see
/// [`crate::controller`]) is just a named sequence of these.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable name used in logs and as the tool name when wrapped via
    /// [`Agent::to_tool`].
    fn name(&self) -> &'static str;

    /// Text prepended to the system role before the filtered history.
    fn system_prefix(&self) -> String;

    /// Which messages from the session's history this agent sees.
    fn filter_strategy(&self) -> FilterStrategy;

    /// The [`MessageType`] this agent's own output is tagged with.
    fn message_type(&self) -> MessageType;

    /// Optional extra system-prompt text built from `ctx.audit_status`/the
    /// task manager rather than parsed out of prior chunk text (spec.md §9
    /// "Structured hand-off"). Appended after [`Agent::system_prefix`] when
    /// present. Most agents don't need one.
    fn audit_hint(&self, _ctx: &SessionContext) -> Option<String> {
        None
    }

    /// Run this agent against `ctx`, returning every chunk it produced in
    /// order (the last one has `is_final = true`).
    async fn run_stream(&self, deps: &AgentDeps, ctx: &mut SessionContext) -> Result<Vec<MessageChunk>> {
        run_agent_loop(self, deps, ctx).await
    }

    /// Wrap this agent as a callable tool: invoking it runs a one-shot
    /// sub-session seeded with the caller's arguments as a user turn and
    /// returns the agent's final answer text. Used for agent-as-tool
    /// recursion.
    fn to_tool(self: Arc<Self>, deps: AgentDeps) -> Tool
    where
        Self: Sized + 'static,
    {
        let name = self.name().to_string();
        let description = format!("Invoke the {} agent as a sub-task", self.name());
        let agent = self;
        Tool::new_contextual(
            name,
            description,
            serde_json::json!({"prompt": "string"}),
            move |args, parent| {
                let agent = agent.clone();
                let deps = deps.clone();
                async move {
                    let prompt = args
                        .get("prompt")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| Error::invalid_argument("missing 'prompt' argument"))?;

                    let child_id = SessionId::new(format!("{}-subtask-{}", agent.name(), now_ts()))?;
                    let mut child_ctx = parent.child_session(child_id.clone());
                    let user_msg = Message::user(child_id.clone(), prompt, now_ts());
                    child_ctx
                        .messages_mut()
                        .apply_chunk(&MessageChunk::builder(
                            format!("{}-seed", child_id),
                            MessageRole::User,
                            MessageType::Normal,
                        )
                        .content(user_msg.content)
                        .session_id(child_id)
                        .is_final(true)
                        .build());

                    let chunks = agent.run_stream(&deps, &mut child_ctx).await?;
                    let answer = chunks
                        .iter()
                        .map(|c| c.content.as_str())
                        .collect::<Vec<_>>()
                        .join("");
                    Ok(serde_json::json!({ "answer": answer }))
                }
            },
        )
    }
}

fn to_openai_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
        MessageRole::System => "system",
    }
}

fn message_to_openai(message: &Message) -> OpenAIMessage {
    OpenAIMessage {
        role: to_openai_role(message.role).to_string(),
        content: message.content.clone(),
        tool_calls: if message.tool_calls.is_empty() {
            None
        } else {
            Some(
                message
                    .tool_calls
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "id": t.id,
                            "type": "function",
                            "function": {"name": t.name, "arguments": t.arguments.to_string()}
                        })
                    })
                    .collect(),
            )
        },
        tool_call_id: message.tool_call_id.clone(),
    }
}

/// The "streaming LLM helper": filter the session's messages for this
/// agent, prepend its system prefix, and issue one chat completion,
/// returning the accumulated text, any requested tool calls, and usage.
async fn call_llm_once(
    agent: &(impl Agent + ?Sized),
    deps: &AgentDeps,
    ctx: &SessionContext,
) -> Result<(String, Vec<ToolCallIntent>, Option<TokenUsage>)> {
    let strategy = agent.filter_strategy();
    let history = ctx.messages().for_llm(&strategy, ctx.context_token_budget());

    let mut system_content = agent.system_prefix();
    if let Some(hint) = agent.audit_hint(ctx) {
        system_content.push_str("\n\n");
        system_content.push_str(&hint);
    }

    let mut wire_messages = vec![OpenAIMessage {
        role: "system".to_string(),
        content: system_content,
        tool_calls: None,
        tool_call_id: None,
    }];
    wire_messages.extend(history.iter().map(message_to_openai));

    let request = ChatRequest {
        model: deps.model.clone(),
        messages: wire_messages,
        max_tokens: None,
        temperature: None,
        tools: {
            let schemas = deps.tool_manager.tool_schemas_filtered(ctx.available_tools());
            if schemas.is_empty() {
                None
            } else {
                Some(schemas)
            }
        },
    };

    let mut stream = llm::stream_chat(
        &deps.http_client,
        &deps.base_url,
        &deps.api_key,
        request,
        ctx.cancel(),
        ctx.session_id(),
        agent.name(),
    )
    .await?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = None;

    while let Some(delta) = stream.next().await {
        if ctx.cancel().is_cancelled() {
            return Err(Error::Cancelled);
        }
        match delta? {
            ChatDelta::Text(t) => text.push_str(&t),
            ChatDelta::ToolCall(tc) => tool_calls.push(tc),
            ChatDelta::Done { usage: u } => {
                usage = u.map(|(input, output)| TokenUsage {
                    input_tokens: input,
                    output_tokens: output,
                    cached_tokens: None,
                    reasoning_tokens: None,
                });
            }
        }
    }

    Ok((text, tool_calls, usage))
}

/// The "tool-execution loop": run `call_llm_once`; if it requested no
/// tools, emit one final chunk and stop. Otherwise execute every requested
/// tool (concurrently, by default) and feed the results back as tool-result
/// chunks, repeating up to `deps.max_loop_count` times before giving up
/// with a terminal `error` chunk.
async fn run_agent_loop(
    agent: &(impl Agent + ?Sized),
    deps: &AgentDeps,
    ctx: &mut SessionContext,
) -> Result<Vec<MessageChunk>> {
    let mut emitted = Vec::new();

    for iteration in 0..deps.max_loop_count {
        if ctx.cancel().is_cancelled() {
            let chunk = MessageChunk::cancelled(ctx.session_id().clone(), format!("{}-cancel", agent.name()), now_ts());
            ctx.messages_mut().apply_chunk(&chunk);
            emitted.push(chunk);
            return Ok(emitted);
        }

        let (text, tool_calls, usage) = call_llm_once(agent, deps, ctx).await?;
        let message_id = format!("{}-{}-{}", ctx.session_id(), agent.name(), iteration);

        let is_final = tool_calls.is_empty();
        let assistant_chunk = MessageChunk::builder(message_id.clone(), MessageRole::Assistant, agent.message_type())
            .content(text)
            .tool_calls(tool_calls.clone())
            .session_id(ctx.session_id().clone())
            .is_final(is_final)
            .timestamp(now_ts())
            .usage_stats(usage.unwrap_or_default())
            .build();
        ctx.messages_mut().apply_chunk(&assistant_chunk);
        emitted.push(assistant_chunk);

        if is_final {
            return Ok(emitted);
        }

        let ctx_ref: &SessionContext = ctx;
        let timestamp = now_ts();
        let per_call_chunks = futures::future::join_all(tool_calls.iter().map(|call| {
            let tool_manager = deps.tool_manager.clone();
            let hooks = deps.hooks.clone();
            let name = call.name.clone();
            let tool_use_id = call.id.clone();
            let arguments = call.arguments.clone();
            let session_id = ctx_ref.session_id().clone();
            let agent_name = agent.name();
            async move {
                let pre_event =
                    PreToolUseEvent::new(session_id.clone(), agent_name, name.clone(), arguments.clone(), tool_use_id.clone());
                let arguments = match hooks.execute_pre_tool_use(pre_event).await {
                    Some(decision) if !decision.continue_execution => {
                        let reason = decision
                            .reason
                            .unwrap_or_else(|| format!("tool '{name}' blocked by pre-tool-use hook"));
                        let blocked = MessageChunk::builder(
                            format!("{session_id}-tool-blocked-{tool_use_id}"),
                            MessageRole::Tool,
                            MessageType::ToolCallResult,
                        )
                        .content(serde_json::json!({"error": reason, "kind": "invalid_argument"}).to_string())
                        .tool_call_id(tool_use_id)
                        .session_id(session_id)
                        .is_final(true)
                        .timestamp(timestamp)
                        .build();
                        return vec![blocked];
                    }
                    Some(decision) => decision.modified_input.unwrap_or(arguments),
                    None => arguments,
                };

                let chunks = tool_manager
                    .call_stream(&name, arguments.clone(), ctx_ref, &tool_use_id, timestamp)
                    .await;

                let observed = chunks
                    .last()
                    .and_then(|c| serde_json::from_str::<Value>(&c.content).ok())
                    .unwrap_or(Value::Null);
                let post_event = PostToolUseEvent::new(session_id, agent_name, name, arguments, tool_use_id, observed);
                hooks.execute_post_tool_use(post_event).await;

                chunks
            }
        }))
        .await;

        for chunk in per_call_chunks.into_iter().flatten() {
            ctx.messages_mut().apply_chunk(&chunk);
            emitted.push(chunk);
        }
    }

    let error_chunk = MessageChunk::builder(
        format!("{}-loop-exhausted", ctx.session_id()),
        MessageRole::Assistant,
        MessageType::Error,
    )
    .content(format!("loop exhausted after {} iterations", deps.max_loop_count))
    .session_id(ctx.session_id().clone())
    .is_final(true)
    .timestamp(now_ts())
    .build();
    ctx.messages_mut().apply_chunk(&error_chunk);
    emitted.push(error_chunk);

    Err(Error::LoopExhausted {
        max_loop_count: deps.max_loop_count,
    })
}
