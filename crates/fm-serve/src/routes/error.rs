use axum::Json;
use axum::http::StatusCode;
use fm_core::ForemanError;
use fm_core::error::{AgentError, ClientError, EventError, ReviewLoopError, WorkflowError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub message: String,
    pub correlation_id: Option<String>,
}

pub fn map_error(
    err: &ForemanError,
    correlation_id: Option<String>,
) -> (StatusCode, Json<ErrorEnvelope>) {
    let (status, code, message) = match err {
        ForemanError::Agent(agent) => map_agent_error(agent),
        ForemanError::Workflow(workflow) => map_workflow_error(workflow),
        ForemanError::ReviewLoop(review_loop) => map_review_loop_error(review_loop),
        ForemanError::Event(event) => map_event_error(event),
        ForemanError::Client(client) => map_client_error(client),
        ForemanError::Internal { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            message.clone(),
        ),
    };

    (
        status,
        Json(ErrorEnvelope {
            code,
            message,
            correlation_id,
        }),
    )
}

fn map_agent_error(err: &AgentError) -> (StatusCode, &'static str, String) {
    match err {
        AgentError::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        AgentError::IllegalState { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_state",
            err.to_string(),
        ),
        AgentError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
        AgentError::Storage { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            err.to_string(),
        ),
    }
}

fn map_workflow_error(err: &WorkflowError) -> (StatusCode, &'static str, String) {
    match err {
        WorkflowError::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        WorkflowError::InvalidTransition { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_state",
            err.to_string(),
        ),
        WorkflowError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
        WorkflowError::Storage { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            err.to_string(),
        ),
    }
}

fn map_review_loop_error(err: &ReviewLoopError) -> (StatusCode, &'static str, String) {
    match err {
        ReviewLoopError::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        ReviewLoopError::InvalidTransition { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_state",
            err.to_string(),
        ),
        ReviewLoopError::MissingPrUrl => (
            StatusCode::PRECONDITION_FAILED,
            "precondition_failed",
            err.to_string(),
        ),
        ReviewLoopError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
        ReviewLoopError::Storage { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            err.to_string(),
        ),
    }
}

fn map_event_error(err: &EventError) -> (StatusCode, &'static str, String) {
    match err {
        EventError::InvalidInput { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_input", err.to_string())
        }
        EventError::Storage { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            err.to_string(),
        ),
    }
}

fn map_client_error(err: &ClientError) -> (StatusCode, &'static str, String) {
    match err {
        ClientError::Unavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            "client_unavailable",
            err.to_string(),
        ),
        ClientError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout", err.to_string()),
        ClientError::RateLimited { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "rate_limited",
            err.to_string(),
        ),
        ClientError::Api { .. } | ClientError::Network { .. } | ClientError::Decode { .. } => (
            StatusCode::BAD_GATEWAY,
            "upstream_error",
            err.to_string(),
        ),
    }
}
