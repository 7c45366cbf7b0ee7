use super::Agent;
use crate::messages::FilterStrategy;
use crate::types::MessageType;
use async_trait::async_trait;

/// Carries out one plan step, calling tools as needed through the shared
/// tool-execution loop. The only agent expected to request tools in `deep`
/// and `standard` mode.
pub struct ExecutorAgent;

#[async_trait]
impl Agent for ExecutorAgent {
    fn name(&self) -> &'static str {
        "executor"
    }

    fn system_prefix(&self) -> String {
        "Carry out the current plan step. Call tools as needed and report \
         what you did and what each tool returned. Stop calling tools once \
         the step is complete and summarize the outcome in plain text."
            .to_string()
    }

    fn filter_strategy(&self) -> FilterStrategy {
        FilterStrategy::execution()
    }

    fn message_type(&self) -> MessageType {
        MessageType::Execution
    }
}
