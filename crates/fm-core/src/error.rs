use crate::types::enums::{AgentStatus, ReviewLoopPhase, WorkflowPhase};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent not found")]
    NotFound,
    #[error("agent is {status:?}; operation requires a running agent")]
    IllegalState { status: AgentStatus },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("storage failure: {message}")]
    Storage { message: String },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow not found")]
    NotFound,
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: WorkflowPhase,
        to: WorkflowPhase,
    },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("storage failure: {message}")]
    Storage { message: String },
}

#[derive(Debug, Error)]
pub enum ReviewLoopError {
    #[error("review loop not found")]
    NotFound,
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ReviewLoopPhase,
        to: ReviewLoopPhase,
    },
    #[error("agent has no pull request")]
    MissingPrUrl,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("storage failure: {message}")]
    Storage { message: String },
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("storage failure: {message}")]
    Storage { message: String },
}

/// External client failures, separated into retryable transients and
/// terminal rejections. Mirrors `fm_clients::ClientError` so the core does
/// not take the HTTP stack into its public surface.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client not configured")]
    Unavailable,
    #[error("request timed out")]
    Timeout,
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("network error: {message}")]
    Network { message: String },
    #[error("decode error: {message}")]
    Decode { message: String },
}

impl From<fm_clients::ClientError> for ClientError {
    fn from(value: fm_clients::ClientError) -> Self {
        match value {
            fm_clients::ClientError::Unavailable => Self::Unavailable,
            fm_clients::ClientError::Timeout => Self::Timeout,
            fm_clients::ClientError::RateLimited { retry_after_secs } => {
                Self::RateLimited { retry_after_secs }
            }
            fm_clients::ClientError::Api { status, message } => Self::Api { status, message },
            fm_clients::ClientError::Network { message } => Self::Network { message },
            fm_clients::ClientError::Decode { message } => Self::Decode { message },
        }
    }
}

#[derive(Debug, Error)]
pub enum ForemanError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    ReviewLoop(#[from] ReviewLoopError),
    #[error(transparent)]
    Event(#[from] EventError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl From<fm_clients::ClientError> for ForemanError {
    fn from(value: fm_clients::ClientError) -> Self {
        ForemanError::Client(ClientError::from(value))
    }
}
