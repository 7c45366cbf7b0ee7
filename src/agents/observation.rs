use super::{now_ts, Agent, AgentDeps};
use crate::messages::FilterStrategy;
use crate::session::SessionContext;
use crate::types::{MessageChunk, MessageRole, MessageType};
use crate::Result;
use async_trait::async_trait;

/// Reviews what an executor step produced against the plan step it was
/// meant to satisfy, flagging whether the subtask should be marked
/// completed, failed, or needs another Planning/Executor pass.
pub struct ObservationAgent;

/// The three outcomes `deep` mode's re-planning loop distinguishes (spec.md
/// §4.5/§9.4): written to `session_context.audit_status` under
/// `observation_verdict` rather than left for the controller to re-derive
/// by scanning chunk text for "fail" again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObservationVerdict {
    Completed,
    Failed,
    NeedsReplan,
}

impl ObservationVerdict {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NeedsReplan => "needs_replan",
        }
    }
}

fn classify(text: &str) -> ObservationVerdict {
    let lower = text.to_lowercase();
    if lower.contains("fail") {
        ObservationVerdict::Failed
    } else if lower.contains("partial") {
        ObservationVerdict::NeedsReplan
    } else if lower.contains("succeed") || lower.contains("complete") || lower.contains("done") {
        ObservationVerdict::Completed
    } else {
        ObservationVerdict::NeedsReplan
    }
}

#[async_trait]
impl Agent for ObservationAgent {
    fn name(&self) -> &'static str {
        "observation"
    }

    fn system_prefix(&self) -> String {
        "Review the executor's output against the plan step it addressed. \
         State plainly whether the step succeeded, partially succeeded, or \
         failed, and what (if anything) still needs to happen. Do not call \
         tools."
            .to_string()
    }

    fn filter_strategy(&self) -> FilterStrategy {
        FilterStrategy::observation()
    }

    fn message_type(&self) -> MessageType {
        MessageType::Observation
    }

    async fn run_stream(&self, deps: &AgentDeps, ctx: &mut SessionContext) -> Result<Vec<MessageChunk>> {
        let (text, _tool_calls, usage) = super::call_llm_once(self, deps, ctx).await?;
        let verdict = classify(&text);
        ctx.set_audit("observation_verdict", serde_json::json!(verdict.as_str()));

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_detects_failure_before_success_keywords() {
        assert_eq!(classify("Partially succeeded but failed the last step."), ObservationVerdict::Failed);
    }

    #[test]
    fn test_classify_detects_partial_as_needs_replan() {
        assert_eq!(classify("Partially succeeded, one more pass needed."), ObservationVerdict::NeedsReplan);
    }

    #[test]
    fn test_classify_detects_completion() {
        assert_eq!(classify("The step succeeded and the report is done."), ObservationVerdict::Completed);
    }

    #[test]
    fn test_classify_defaults_to_needs_replan() {
        assert_eq!(classify("Unclear what happened here."), ObservationVerdict::NeedsReplan);
    }
}
