//! Agent Flow (Component H): the `custom` mode's vehicle — a caller-supplied,
//! positionally ordered list of agents, run with no task-manager
//! consultation. Shares [`crate::controller::run_agent_sequence`] with the
//! controller's own `standard` dispatch so both paths behave identically.

use crate::agents::{Agent, AgentDeps};
use crate::controller::run_agent_sequence;
use crate::session::SessionContext;
use crate::types::MessageChunk;
use crate::Result;
use std::sync::Arc;

/// A fixed, caller-defined sequence of agents to run in order.
pub struct AgentFlow {
    agents: Vec<Arc<dyn Agent>>,
}

impl AgentFlow {
    pub fn new(agents: Vec<Arc<dyn Agent>>) -> Self {
        Self { agents }
    }

    pub fn agent_names(&self) -> Vec<&'static str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub async fn run_stream(&self, deps: &AgentDeps, ctx: &mut SessionContext) -> Result<Vec<MessageChunk>> {
        run_agent_sequence(&self.agents, deps, ctx).await
    }
}
