use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Remote agent lifecycle as reported by the Agent API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AgentStatus {
    Creating,
    Running,
    Finished,
    Failed,
    Stopped,
}

impl AgentStatus {
    /// Terminal agents are never polled again and leave the active index.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Stopped)
    }
}

/// What a launched agent is for, used to route poller-detected completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum AgentRole {
    Standalone,
    Planner,
    Implementer,
    Fix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum WorkflowPhase {
    ContextReview,
    Planning,
    PlanReview,
    Implementing,
    Complete,
    Rejected,
}

impl WorkflowPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ReviewLoopPhase {
    RequestingReview,
    AwaitingReview,
    Fixing,
    Approved,
    HumanReview,
    Complete,
    MaxIterations,
    Failed,
}

impl ReviewLoopPhase {
    /// Final phases record no further transitions and no further history.
    pub fn is_final(self) -> bool {
        matches!(self, Self::Complete | Self::MaxIterations | Self::Failed)
    }
}

/// Accept/reject choice delivered by a chat action button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum WorkflowAction {
    Accept,
    Reject,
}

/// Semantic outcome of a submitted code-host review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ReviewVerdict {
    Approved,
    ChangesRequested,
    Commented,
}
