use crate::types::agent::AgentRecord;
use crate::types::enums::{AgentStatus, ReviewLoopPhase, WorkflowPhase};
use crate::types::ids::{AgentId, ReviewLoopId, WorkflowId};
use crate::types::review_loop::ReviewLoopRecord;
use crate::types::workflow::WorkflowRecord;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One notification per state transition. The presentation layer renders
/// these in place of the original chat post; each variant carries the full
/// record so no follow-up query is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "payload")]
pub enum EventBody {
    AgentLaunched {
        agent: AgentRecord,
    },
    AgentStatusChanged {
        agent: AgentRecord,
        from: AgentStatus,
        to: AgentStatus,
    },
    AgentStopped {
        agent_id: AgentId,
    },
    AgentDeleted {
        agent_id: AgentId,
    },

    WorkflowPhaseChanged {
        workflow: WorkflowRecord,
        from: Option<WorkflowPhase>,
        to: WorkflowPhase,
        /// Agent launched as part of this transition, if any.
        launched_agent_id: Option<AgentId>,
    },
    PlanRevisionRequested {
        workflow: WorkflowRecord,
        iteration: u32,
    },

    ReviewLoopPhaseChanged {
        review_loop: ReviewLoopRecord,
        from: Option<ReviewLoopPhase>,
        to: ReviewLoopPhase,
        detail: String,
    },
    ReviewLoopExhausted {
        review_loop_id: ReviewLoopId,
        iterations: u32,
    },
    ReviewLoopFailed {
        review_loop_id: ReviewLoopId,
        reason: String,
    },
}
