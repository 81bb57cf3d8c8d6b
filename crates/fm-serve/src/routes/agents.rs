use crate::middleware::correlation::CorrelationId;
use crate::routes::error::map_error;
use crate::{AppState, build_foreman};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use fm_core::RequestContext;
use fm_core::error::AgentError;
use fm_core::types::io::{AgentFilter, FollowUpInput, LaunchInput};
use fm_core::types::{AgentId, AgentRecord, LaunchOutcome};
use fm_events::types::EventSource;
use utoipa::ToSchema;

#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct ArchiveInput {
    pub archived: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/agents", post(launch).get(list_agents))
        .route("/agents/{id}", get(get_agent).delete(delete_agent))
        .route("/agents/{id}/follow-up", post(follow_up))
        .route("/agents/{id}/cancel", post(cancel))
        .route("/agents/{id}/archive", post(archive))
        .with_state(state)
}

fn parse_id(id: &str, correlation_id: &CorrelationId) -> Result<AgentId, Response> {
    AgentId::new(id.to_string()).map_err(|err| {
        map_error(
            &fm_core::ForemanError::Agent(AgentError::InvalidInput {
                message: err.to_string(),
            }),
            Some(correlation_id.0.clone()),
        )
        .into_response()
    })
}

#[utoipa::path(
    post,
    path = "/api/agents",
    request_body = LaunchInput,
    responses((status = 200, body = LaunchOutcome))
)]
pub(crate) async fn launch(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Json(input): Json<LaunchInput>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let ctx = RequestContext::new(EventSource::Rest, Some(correlation.0.clone()));
    match foreman.agents().launch(&ctx, input).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/agents",
    params(AgentFilter),
    responses((status = 200, body = Vec<AgentRecord>))
)]
pub(crate) async fn list_agents(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Query(filter): Query<AgentFilter>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    match foreman.agents().list(&filter) {
        Ok(agents) => Json(agents).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/agents/{id}",
    params(("id" = String, Path, description = "Agent ID")),
    responses((status = 200, body = AgentRecord))
)]
pub(crate) async fn get_agent(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let agent_id = match parse_id(&id, &correlation) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let ctx = RequestContext::new(EventSource::Rest, Some(correlation.0.clone()));
    match foreman.agents().get(&ctx, &agent_id).await {
        Ok(agent) => Json(agent).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/agents/{id}/follow-up",
    request_body = FollowUpInput,
    params(("id" = String, Path, description = "Agent ID")),
    responses((status = 204))
)]
pub(crate) async fn follow_up(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
    Json(input): Json<FollowUpInput>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let agent_id = match parse_id(&id, &correlation) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let ctx = RequestContext::new(EventSource::Rest, Some(correlation.0.clone()));
    match foreman.agents().follow_up(&ctx, &agent_id, input).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/agents/{id}/cancel",
    params(("id" = String, Path, description = "Agent ID")),
    responses((status = 200, body = AgentRecord))
)]
pub(crate) async fn cancel(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let agent_id = match parse_id(&id, &correlation) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let ctx = RequestContext::new(EventSource::Rest, Some(correlation.0.clone()));
    match foreman.agents().cancel(&ctx, &agent_id).await {
        Ok(agent) => Json(agent).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/agents/{id}/archive",
    request_body = ArchiveInput,
    params(("id" = String, Path, description = "Agent ID")),
    responses((status = 200, body = AgentRecord))
)]
pub(crate) async fn archive(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
    Json(input): Json<ArchiveInput>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let agent_id = match parse_id(&id, &correlation) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let ctx = RequestContext::new(EventSource::Rest, Some(correlation.0.clone()));
    match foreman.agents().archive(&ctx, &agent_id, input.archived) {
        Ok(agent) => Json(agent).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/agents/{id}",
    params(("id" = String, Path, description = "Agent ID")),
    responses((status = 204))
)]
pub(crate) async fn delete_agent(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let agent_id = match parse_id(&id, &correlation) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let ctx = RequestContext::new(EventSource::Rest, Some(correlation.0.clone()));
    match foreman.agents().delete(&ctx, &agent_id) {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}
