use super::{now_ts, Agent, AgentDeps};
use crate::messages::FilterStrategy;
use crate::session::SessionContext;
use crate::types::{MessageChunk, MessageRole, MessageType};
use crate::Result;
use async_trait::async_trait;

/// Classifies an incoming request into one of the controller's modes
/// (`deep`, `standard`, `rapid`) before any other agent runs. Used by
/// callers that don't already know which mode a request needs.
pub struct TaskRouterAgent;

const VALID_MODES: [&str; 3] = ["deep", "standard", "rapid"];

#[async_trait]
impl Agent for TaskRouterAgent {
    fn name(&self) -> &'static str {
        "task_router"
    }

    fn system_prefix(&self) -> String {
        "Classify the user's request into exactly one word: 'deep' for \
         multi-step work that benefits from decomposition, 'standard' for a \
         single focused task, or 'rapid' for a quick question or one tool \
         call. Respond with only that word."
            .to_string()
    }

    fn filter_strategy(&self) -> FilterStrategy {
        FilterStrategy::task_analysis()
    }

    fn message_type(&self) -> MessageType {
        MessageType::Guide
    }

    async fn run_stream(&self, deps: &AgentDeps, ctx: &mut SessionContext) -> Result<Vec<MessageChunk>> {
        let (text, _tool_calls, usage) = super::call_llm_once(self, deps, ctx).await?;
        let mode = classify(&text);

        let chunk = MessageChunk::builder(
            format!("{}-{}", ctx.session_id(), self.name()),
            MessageRole::Assistant,
            self.message_type(),
        )
        .content(mode.to_string())
        .session_id(ctx.session_id().clone())
        .is_final(true)
        .timestamp(now_ts())
        .usage_stats(usage.unwrap_or_default())
        .build();
        ctx.messages_mut().apply_chunk(&chunk);

        Ok(vec![chunk])
    }
}

fn classify(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    VALID_MODES
        .into_iter()
        .find(|mode| lower.contains(mode))
        .unwrap_or("standard")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_exact_word() {
        assert_eq!(classify("deep"), "deep");
        assert_eq!(classify("Rapid"), "rapid");
    }

    #[test]
    fn test_classify_falls_back_to_standard() {
        assert_eq!(classify("I'm not sure"), "standard");
    }
}
