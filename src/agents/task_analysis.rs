use super::Agent;
use crate::messages::FilterStrategy;
use crate::types::MessageType;
use async_trait::async_trait;

/// First stage of `deep` and `standard` mode: restates the user's request as
/// a structured understanding of goal, constraints, and success criteria,
/// without touching tools.
pub struct TaskAnalysisAgent;

#[async_trait]
impl Agent for TaskAnalysisAgent {
    fn name(&self) -> &'static str {
        "task_analysis"
    }

    fn system_prefix(&self) -> String {
        "You analyze the user's request before any planning happens. \
         Identify the underlying goal, explicit constraints, and what a \
         successful result looks like. Do not propose a plan or call tools \
         yet; that is the next agent's job."
            .to_string()
    }

    fn filter_strategy(&self) -> FilterStrategy {
        FilterStrategy::task_analysis()
    }

    fn message_type(&self) -> MessageType {
        MessageType::TaskAnalysis
    }
}
