use super::Agent;
use crate::messages::FilterStrategy;
use crate::types::MessageType;
use async_trait::async_trait;

/// Final stage of `deep` and `standard` mode (and of `rapid` mode when
/// forced): synthesizes everything that happened into one user-facing
/// answer. Run even after a partial task failure, so the caller always gets
/// a coherent final message instead of a bare error.
///
/// `more_suggest` mirrors the wire request's `more_suggest` hint (spec.md
/// §6/§9): when set, the agent is asked to append a short "suggested
/// follow-ups" section after the answer proper.
pub struct SummaryAgent {
    more_suggest: bool,
}

impl SummaryAgent {
    pub fn new(more_suggest: bool) -> Self {
        Self { more_suggest }
    }
}

impl Default for SummaryAgent {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl Agent for SummaryAgent {
    fn name(&self) -> &'static str {
        "summary"
    }

    fn system_prefix(&self) -> String {
        let base = "Write the final answer for the user, drawing on everything the \
         prior agents produced. If any subtask failed, say so plainly and \
         explain what was and was not accomplished. Do not call tools.";
        if self.more_suggest {
            format!(
                "{base} After the answer, add a short \"Suggested follow-ups\" \
                 section with 2-3 natural next questions the user might ask."
            )
        } else {
            base.to_string()
        }
    }

    fn filter_strategy(&self) -> FilterStrategy {
        FilterStrategy::summary()
    }

    fn message_type(&self) -> MessageType {
        MessageType::FinalAnswer
    }
}
