use super::Agent;
use crate::messages::FilterStrategy;
use crate::session::SessionContext;
use crate::types::{MessageType, TaskStatus};
use async_trait::async_trait;

/// Produces a concrete, ordered action plan for the current task (or
/// subtask, in `deep` mode) without yet calling tools.
pub struct PlanningAgent;

#[async_trait]
impl Agent for PlanningAgent {
    fn name(&self) -> &'static str {
        "planning"
    }

    fn system_prefix(&self) -> String {
        "Given the task analysis, produce a short ordered plan of concrete \
         steps an executor will carry out, including which tools each step \
         is expected to need. Do not call tools yourself."
            .to_string()
    }

    fn filter_strategy(&self) -> FilterStrategy {
        FilterStrategy::planning()
    }

    fn message_type(&self) -> MessageType {
        MessageType::Planning
    }

    /// Names the task the controller just marked `in_progress`, read from
    /// the task manager rather than re-derived from the decomposition
    /// agent's prose (spec.md §9 "Structured hand-off").
    fn audit_hint(&self, ctx: &SessionContext) -> Option<String> {
        let current: Vec<&str> = ctx
            .tasks()
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .map(|t| t.description.as_str())
            .collect();
        if current.is_empty() {
            return None;
        }
        Some(format!("Current task(s) to plan for: {}", current.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;
    use std::path::PathBuf;

    #[test]
    fn test_audit_hint_none_without_in_progress_tasks() {
        let ctx = SessionContext::new(SessionId::new("s1").unwrap(), PathBuf::from("/tmp/ws-planning"), 4096);
        assert_eq!(PlanningAgent.audit_hint(&ctx), None);
    }

    #[test]
    fn test_audit_hint_names_in_progress_task() {
        let mut ctx = SessionContext::new(SessionId::new("s1").unwrap(), PathBuf::from("/tmp/ws-planning"), 4096);
        let task_id = ctx.tasks_mut().create_task("fetch the data", vec![]).unwrap();
        ctx.tasks_mut()
            .update_task(&task_id, Some(TaskStatus::InProgress), None, None, 0)
            .unwrap();

        let hint = PlanningAgent.audit_hint(&ctx).unwrap();
        assert!(hint.contains("fetch the data"));
    }
}
