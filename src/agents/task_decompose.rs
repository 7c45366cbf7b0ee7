use super::{now_ts, Agent, AgentDeps};
use crate::messages::FilterStrategy;
use crate::session::SessionContext;
use crate::types::{MessageChunk, MessageRole, MessageType};
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SubtaskSpec {
    description: String,
    #[serde(default)]
    depends_on: Vec<usize>,
}

/// Second stage of `deep` mode: turns the task-analysis output into a
/// dependency-ordered set of subtasks, registering them with the session's
/// task manager and recording the raw breakdown under
/// `task_decomposition_results` for downstream agents to inspect.
pub struct TaskDecomposeAgent;

#[async_trait]
impl Agent for TaskDecomposeAgent {
    fn name(&self) -> &'static str {
        "task_decompose"
    }

    fn system_prefix(&self) -> String {
        "Break the analyzed request into an ordered list of independent, \
         reviewable subtasks. Respond with a JSON array only, each element \
         shaped as {\"description\": string, \"depends_on\": [indices of \
         earlier subtasks this one depends on]}."
            .to_string()
    }

    fn filter_strategy(&self) -> FilterStrategy {
        FilterStrategy::task_analysis()
    }

    fn message_type(&self) -> MessageType {
        MessageType::Planning
    }

    async fn run_stream(&self, deps: &AgentDeps, ctx: &mut SessionContext) -> Result<Vec<MessageChunk>> {
        let (text, _tool_calls, usage) = super::call_llm_once(self, deps, ctx).await?;

        let specs: Vec<SubtaskSpec> = extract_json_array(&text).unwrap_or_default();

        let mut created_ids = Vec::with_capacity(specs.len());
        for spec in &specs {
            let dependencies = spec
                .depends_on
                .iter()
                .filter_map(|&idx| created_ids.get(idx).cloned())
                .collect();
            let task_id = ctx.tasks_mut().create_task(spec.description.clone(), dependencies)?;
            created_ids.push(task_id);
        }

        ctx.set_audit(
            "task_decomposition_results",
            serde_json::json!(specs
                .iter()
                .map(|s| s.description.clone())
                .collect::<Vec<_>>()),
        );

        let chunk = MessageChunk::builder(
            format!("{}-{}", ctx.session_id(), self.name()),
            MessageRole::Assistant,
            self.message_type(),
        )
        .content(text)
        .session_id(ctx.session_id().clone())
        .is_final(true)
        .timestamp(now_ts())
        .usage_stats(usage.unwrap_or_default())
        .build();
        ctx.messages_mut().apply_chunk(&chunk);

        Ok(vec![chunk])
    }
}

/// Best-effort extraction of a JSON array from model output that may wrap it
/// in prose or a fenced code block.
fn extract_json_array(text: &str) -> Option<Vec<SubtaskSpec>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_array_plain() {
        let text = r#"[{"description": "step one"}, {"description": "step two", "depends_on": [0]}]"#;
        let specs = extract_json_array(text).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].depends_on, vec![0]);
    }

    #[test]
    fn test_extract_json_array_wrapped_in_prose() {
        let text = "Here is the plan:\n```json\n[{\"description\": \"a\"}]\n```\nDone.";
        let specs = extract_json_array(text).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].description, "a");
    }

    #[test]
    fn test_extract_json_array_invalid_returns_none() {
        assert!(extract_json_array("no json here").is_none());
    }
}
