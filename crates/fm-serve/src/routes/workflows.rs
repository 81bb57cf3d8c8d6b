use crate::middleware::correlation::CorrelationId;
use crate::routes::error::map_error;
use crate::{AppState, build_foreman};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use fm_core::RequestContext;
use fm_core::error::WorkflowError;
use fm_core::types::io::WorkflowActionInput;
use fm_core::types::{WorkflowActionOutcome, WorkflowId, WorkflowRecord};
use fm_events::types::EventSource;
use std::str::FromStr;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workflows/{id}", get(get_workflow))
        .route("/workflows/{id}/action", post(handle_action))
        .with_state(state)
}

fn parse_id(id: &str, correlation_id: &CorrelationId) -> Result<WorkflowId, Response> {
    WorkflowId::from_str(id).map_err(|err| {
        map_error(
            &fm_core::ForemanError::Workflow(WorkflowError::InvalidInput {
                message: err.to_string(),
            }),
            Some(correlation_id.0.clone()),
        )
        .into_response()
    })
}

#[utoipa::path(
    get,
    path = "/api/workflows/{id}",
    params(("id" = String, Path, description = "Workflow ID")),
    responses((status = 200, body = WorkflowRecord))
)]
pub(crate) async fn get_workflow(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let workflow_id = match parse_id(&id, &correlation) {
        Ok(value) => value,
        Err(response) => return response,
    };
    match foreman.workflows().get(&workflow_id) {
        Ok(workflow) => Json(workflow).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/workflows/{id}/action",
    request_body = WorkflowActionInput,
    params(("id" = String, Path, description = "Workflow ID")),
    responses((status = 200, body = WorkflowActionOutcome))
)]
pub(crate) async fn handle_action(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
    Json(input): Json<WorkflowActionInput>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let workflow_id = match parse_id(&id, &correlation) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let ctx = RequestContext::new(EventSource::Rest, Some(correlation.0.clone()));
    match foreman
        .workflows()
        .handle_action(&ctx, &workflow_id, input)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}
