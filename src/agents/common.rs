use super::Agent;
use crate::messages::FilterStrategy;
use crate::types::MessageType;
use async_trait::async_trait;

/// General-purpose single agent for `custom` flows that don't need any of
/// the named specialized roles: no assumptions about task structure beyond
/// "see the whole filtered history, answer, use tools freely".
pub struct CommonAgent;

#[async_trait]
impl Agent for CommonAgent {
    fn name(&self) -> &'static str {
        "common"
    }

    fn system_prefix(&self) -> String {
        "You are a general-purpose assistant with access to the registered \
         tools. Use them as needed to satisfy the request."
            .to_string()
    }

    fn filter_strategy(&self) -> FilterStrategy {
        FilterStrategy::default_strategy()
    }

    fn message_type(&self) -> MessageType {
        MessageType::Normal
    }
}
