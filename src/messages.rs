//! Message Manager (Component C): accumulates streaming [`MessageChunk`]s
//! into logical [`Message`]s, applies per-agent filter strategies, and
//! compresses a filtered list to fit a token budget before it is sent to the
//! LLM.

use crate::types::{Message, MessageRole, MessageType};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

const ELLIPSIS: &str = "... [truncated]";
const CHARS_PER_TOKEN: usize = 4;
const ROLE_OVERHEAD_CHARS: usize = 8;
const CONVERSATION_OVERHEAD_CHARS: usize = 16;

/// Character-based token estimate (~4 chars/token), used unless the LLM
/// client ever supplies a real tokenizer count.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0;
    for message in messages {
        total_chars += ROLE_OVERHEAD_CHARS;
        total_chars += message.content.len();
        for call in &message.tool_calls {
            total_chars += call.name.len() + call.id.len() + call.arguments.to_string().len();
        }
    }
    total_chars += CONVERSATION_OVERHEAD_CHARS;

    (total_chars + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN
}

pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let threshold = (limit as f32 * margin) as usize;
    estimate_tokens(messages) > threshold
}

// ============================================================================
// FILTER STRATEGY
// ============================================================================

/// A named rule selecting which logical messages enter a given agent's
/// prompt: an include predicate over `(role, type)` plus a recent-turns
/// window applied after filtering.
#[derive(Clone)]
pub struct FilterStrategy {
    name: &'static str,
    include: fn(MessageRole, MessageType) -> bool,
    recent_turns: usize,
}

impl FilterStrategy {
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, messages: &[Message]) -> Vec<Message> {
        let filtered: Vec<Message> = messages
            .iter()
            .filter(|m| (self.include)(m.role, m.message_type))
            .cloned()
            .collect();

        if self.recent_turns == 0 || filtered.len() <= self.recent_turns {
            return filtered;
        }
        let start = filtered.len() - self.recent_turns;
        filtered[start..].to_vec()
    }

    pub fn task_analysis() -> Self {
        Self {
            name: "task_analysis",
            include: |role, ty| {
                role == MessageRole::User || matches!(ty, MessageType::TaskAnalysis)
            },
            recent_turns: 1,
        }
    }

    pub fn planning() -> Self {
        Self {
            name: "planning",
            include: |_, ty| {
                matches!(
                    ty,
                    MessageType::Planning
                        | MessageType::TaskAnalysis
                        | MessageType::Observation
                        | MessageType::Normal
                )
            },
            recent_turns: 10,
        }
    }

    pub fn execution() -> Self {
        Self {
            name: "execution",
            include: |_, ty| {
                matches!(
                    ty,
                    MessageType::Execution
                        | MessageType::ToolCall
                        | MessageType::ToolCallResult
                        | MessageType::Planning
                )
            },
            recent_turns: 20,
        }
    }

    pub fn observation() -> Self {
        Self {
            name: "observation",
            include: |_, ty| {
                matches!(
                    ty,
                    MessageType::Execution | MessageType::Observation | MessageType::ToolCallResult
                )
            },
            recent_turns: 20,
        }
    }

    pub fn summary() -> Self {
        Self {
            name: "summary",
            include: |_, _| true,
            recent_turns: 0,
        }
    }

    pub fn default_strategy() -> Self {
        Self {
            name: "default",
            include: |_, ty| !matches!(ty, MessageType::Thinking),
            recent_turns: 0,
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "task_analysis" => Some(Self::task_analysis()),
            "planning" => Some(Self::planning()),
            "execution" => Some(Self::execution()),
            "observation" => Some(Self::observation()),
            "summary" => Some(Self::summary()),
            "default" => Some(Self::default_strategy()),
            _ => None,
        }
    }
}

// ============================================================================
// COMPRESSION
// ============================================================================

/// Compress `messages` to fit `budget` tokens, per the three-step algorithm:
/// keep the latest user turn and latest final assistant message and
/// referenced tool results unconditionally; summarize older
/// thinking/planning/observation messages into one synthetic
/// `stage_summary`; truncate the oldest retained message contents last.
pub fn compress_to_budget(messages: &[Message], budget: usize) -> Vec<Message> {
    if estimate_tokens(messages) <= budget {
        return messages.to_vec();
    }

    let last_user_idx = messages.iter().rposition(|m| m.role == MessageRole::User);
    let last_final_idx = messages
        .iter()
        .rposition(|m| m.message_type == MessageType::FinalAnswer || m.role == MessageRole::Assistant);

    let mut pinned = std::collections::HashSet::new();
    if let Some(i) = last_user_idx {
        pinned.insert(i);
    }
    if let Some(i) = last_final_idx {
        pinned.insert(i);
    }
    // Tool results referenced by a still-pinned tool call.
    let referenced_ids: std::collections::HashSet<String> = pinned
        .iter()
        .filter_map(|&i| messages.get(i))
        .flat_map(|m| m.tool_calls.iter().map(|t| t.id.clone()))
        .collect();
    for (i, m) in messages.iter().enumerate() {
        if m.role == MessageRole::Tool {
            if let Some(id) = &m.tool_call_id {
                if referenced_ids.contains(id) {
                    pinned.insert(i);
                }
            }
        }
    }

    // Step 2: fold older thinking/planning/observation messages into one
    // synthetic stage_summary if they're collectively large.
    let summarizable_idx: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(i, m)| {
            !pinned.contains(i)
                && matches!(
                    m.message_type,
                    MessageType::Thinking | MessageType::Planning | MessageType::Observation
                )
        })
        .map(|(i, _)| i)
        .collect();

    let mut result: Vec<Message> = Vec::new();
    let mut folded = false;

    for (i, m) in messages.iter().enumerate() {
        if summarizable_idx.contains(&i) {
            if !folded {
                let combined_tokens: usize = summarizable_idx
                    .iter()
                    .filter_map(|j| messages.get(*j))
                    .map(|m| m.content.len() / CHARS_PER_TOKEN)
                    .sum();
                if combined_tokens * CHARS_PER_TOKEN > budget / 4 {
                    let summary_text: String = summarizable_idx
                        .iter()
                        .filter_map(|j| messages.get(*j))
                        .map(|m| m.content.as_str())
                        .collect::<Vec<_>>()
                        .join(" / ");
                    let mut summary = m.clone();
                    summary.message_type = MessageType::StageSummary;
                    summary.content = summary_text;
                    result.push(summary);
                    folded = true;
                } else {
                    result.push(m.clone());
                }
            }
            continue;
        }
        result.push(m.clone());
    }

    // Step 3: truncate oldest retained contents last, until under budget.
    let mut idx = 0;
    while estimate_tokens(&result) > budget && idx < result.len() {
        if !pinned.contains(&idx) {
            let keep_chars = budget.saturating_mul(CHARS_PER_TOKEN) / result.len().max(1);
            let msg = &mut result[idx];
            if msg.content.len() > keep_chars {
                msg.content.truncate(keep_chars);
                msg.content.push_str(ELLIPSIS);
            }
        }
        idx += 1;
    }

    result
}

// ============================================================================
// MESSAGE MANAGER
// ============================================================================

/// Owns the accumulated logical message list for one session and performs
/// merge/filter/compress/persist.
pub struct MessageManager {
    messages: Vec<Message>,
    workspace_root: PathBuf,
}

impl MessageManager {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            messages: Vec::new(),
            workspace_root,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Apply the merge rule for one incoming chunk: append to an existing
    /// logical message with the same `message_id`, replacing rather than
    /// appending for tool-result chunks; otherwise start a new one. Chunks
    /// with empty content, no tool calls, and not final are discarded.
    pub fn apply_chunk(&mut self, chunk: &crate::types::MessageChunk) {
        if chunk.content.is_empty() && chunk.tool_calls.is_empty() && !chunk.is_final {
            return;
        }

        if let Some(existing) = self
            .messages
            .iter_mut()
            .find(|m| m.message_id == chunk.message_id)
        {
            existing.apply_chunk(chunk);
        } else {
            self.messages.push(Message::from_first_chunk(chunk));
        }
    }

    /// Produce the message list for an LLM call: filter by `strategy`, then
    /// compress to `budget` tokens.
    pub fn for_llm(&self, strategy: &FilterStrategy, budget: usize) -> Vec<Message> {
        let filtered = strategy.apply(&self.messages);
        compress_to_budget(&filtered, budget)
    }

    /// Persist the message list atomically: write to a `.tmp` sibling, then
    /// rename over the target.
    pub async fn persist(&self) -> Result<()> {
        let target = self.workspace_root.join("messages.json");
        let tmp = self.workspace_root.join("messages.json.tmp");
        let json = serde_json::to_vec_pretty(&self.messages)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(Error::Io)?;
        Ok(())
    }

    pub async fn load(workspace_root: PathBuf) -> Result<Self> {
        let path = workspace_root.join("messages.json");
        let messages = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Self {
            messages,
            workspace_root,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}
