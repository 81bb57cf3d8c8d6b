pub mod agent;
pub mod enums;
pub mod event;
pub mod ids;
pub mod io;
pub mod review_loop;
pub mod workflow;

pub use agent::{AgentRecord, Origin};
pub use enums::{
    AgentRole, AgentStatus, ReviewLoopPhase, ReviewVerdict, WorkflowAction, WorkflowPhase,
};
pub use event::EventBody;
pub use ids::{AgentId, IdError, ReviewLoopId, WorkflowId};
pub use io::{
    AgentFilter, FollowUpInput, LaunchInput, LaunchOutcome, SweepStats, WebhookEvent,
    WebhookPayload, WorkflowActionInput, WorkflowActionOutcome,
};
pub use review_loop::{ReviewLoopHistoryEntry, ReviewLoopRecord};
pub use workflow::WorkflowRecord;
