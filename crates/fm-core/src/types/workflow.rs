use crate::types::agent::Origin;
use crate::types::enums::WorkflowPhase;
use crate::types::ids::{AgentId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One HITL-gated request. Carries its own copy of the launch parameters
/// because the implementer agent is launched long after the original
/// request, from whatever plan survived review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub phase: WorkflowPhase,
    pub plan_iteration_count: u32,
    pub context: Option<String>,
    pub plan: Option<String>,
    pub planner_agent_id: Option<AgentId>,
    pub implementer_agent_id: Option<AgentId>,
    pub skip_context_review: bool,
    pub skip_plan_review: bool,
    pub repo: String,
    pub branch: Option<String>,
    pub target_branch: Option<String>,
    pub prompt: String,
    pub model: Option<String>,
    pub origin: Origin,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
