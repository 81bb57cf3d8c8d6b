use crate::types::enums::{AgentRole, AgentStatus};
use crate::types::ids::{AgentId, ReviewLoopId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Where in the chat surface a launch originated. Carried on records so the
/// presentation layer can render status updates in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Origin {
    pub channel_id: String,
    pub post_id: String,
    pub user_id: String,
}

/// One launched remote agent. The id is the remote service's id; the record
/// is the durable mirror of what the Agent API last reported, plus linkage
/// to the workflow or review loop the agent belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgentRecord {
    pub id: AgentId,
    pub origin: Origin,
    pub status: AgentStatus,
    pub role: AgentRole,
    pub repo: String,
    pub branch: Option<String>,
    pub target_branch: Option<String>,
    pub prompt: String,
    pub model: Option<String>,
    pub pr_url: Option<String>,
    pub summary: Option<String>,
    pub workflow_id: Option<WorkflowId>,
    pub review_loop_id: Option<ReviewLoopId>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
