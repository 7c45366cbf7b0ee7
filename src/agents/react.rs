use super::Agent;
use crate::messages::FilterStrategy;
use crate::types::MessageType;
use async_trait::async_trait;

/// A single-agent reason-then-act loop: thinks out loud between tool calls
/// rather than silently chaining them, useful for `custom` flows that want
/// visible intermediate reasoning without a full decomposition pipeline.
pub struct ReactAgent;

#[async_trait]
impl Agent for ReactAgent {
    fn name(&self) -> &'static str {
        "react"
    }

    fn system_prefix(&self) -> String {
        "Work through the user's request step by step. Before each tool \
         call, briefly state what you're about to try and why. After the \
         last tool call, give the final answer."
            .to_string()
    }

    fn filter_strategy(&self) -> FilterStrategy {
        FilterStrategy::default_strategy()
    }

    fn message_type(&self) -> MessageType {
        MessageType::Thinking
    }
}
