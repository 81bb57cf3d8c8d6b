use crate::types::agent::{AgentRecord, Origin};
use crate::types::enums::{ReviewVerdict, WorkflowAction, WorkflowPhase};
use crate::types::workflow::WorkflowRecord;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LaunchInput {
    pub prompt: String,
    pub repo: String,
    pub branch: Option<String>,
    pub target_branch: Option<String>,
    pub model: Option<String>,
    pub origin: Origin,
    /// When false the implementer is launched directly with no workflow.
    #[serde(default)]
    pub hitl: bool,
    #[serde(default)]
    pub skip_context_review: bool,
    #[serde(default)]
    pub skip_plan_review: bool,
}

/// What a launch produced: either a directly launched agent, or a workflow
/// waiting at its first review gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "payload")]
pub enum LaunchOutcome {
    Agent(AgentRecord),
    Workflow(WorkflowRecord),
}

/// Result of a workflow action command. `stale` means the button's expected
/// phase no longer matched and nothing happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WorkflowActionOutcome {
    pub workflow: WorkflowRecord,
    pub stale: bool,
}

/// Per-tick reconciliation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SweepStats {
    pub checked: u64,
    pub updated: u64,
    pub failed: u64,
}

/// An accept/reject button press. `expected_phase` is the phase the button
/// was rendered for; a mismatch with the current phase means the button is
/// stale and the command is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WorkflowActionInput {
    pub expected_phase: WorkflowPhase,
    pub action: WorkflowAction,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FollowUpInput {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, IntoParams)]
pub struct AgentFilter {
    pub archived: Option<bool>,
    pub user_id: Option<String>,
}

/// The semantic payload of a verified inbound code-host delivery, after the
/// routing layer has stripped transport details. Signature verification
/// happens upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WebhookEvent {
    pub delivery_id: String,
    pub pr_url: Option<String>,
    pub branch: Option<String>,
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "payload")]
pub enum WebhookPayload {
    ReviewSubmitted {
        reviewer: String,
        verdict: ReviewVerdict,
        body: Option<String>,
    },
    CommentCreated {
        author: String,
        body: String,
    },
    PrClosed {
        merged: bool,
    },
}
