use crate::types::enums::ReviewLoopPhase;
use crate::types::ids::{AgentId, ReviewLoopId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One PR moving through the automated review cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReviewLoopRecord {
    pub id: ReviewLoopId,
    pub agent_id: AgentId,
    pub pr_url: String,
    pub branch: Option<String>,
    pub phase: ReviewLoopPhase,
    pub iteration: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit trail entry; one per transition, used for the timeline
/// display and never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReviewLoopHistoryEntry {
    pub loop_id: ReviewLoopId,
    pub phase: ReviewLoopPhase,
    pub detail: String,
    pub at: DateTime<Utc>,
}
