use super::Agent;
use crate::messages::FilterStrategy;
use crate::types::MessageType;
use async_trait::async_trait;

/// `rapid` mode's default agent: answers directly, calling at most a
/// handful of tools, with no task analysis or decomposition stage.
pub struct SimpleAgent;

#[async_trait]
impl Agent for SimpleAgent {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn system_prefix(&self) -> String {
        "Answer the user's request directly. Use a tool only if the answer \
         genuinely requires it.".to_string()
    }

    fn filter_strategy(&self) -> FilterStrategy {
        FilterStrategy::default_strategy()
    }

    fn message_type(&self) -> MessageType {
        MessageType::Normal
    }
}
