use utoipa::OpenApi;

use crate::routes::agents::ArchiveInput;
use crate::routes::events::EventsQuery;
use crate::routes::webhooks::WebhookAck;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use fm_core::types::agent::{AgentRecord, Origin};
use fm_core::types::enums::{
    AgentRole, AgentStatus, ReviewLoopPhase, ReviewVerdict, WorkflowAction, WorkflowPhase,
};
use fm_core::types::ids::{AgentId, ReviewLoopId, WorkflowId};
use fm_core::types::io::{
    AgentFilter, FollowUpInput, LaunchInput, LaunchOutcome, SweepStats, WebhookEvent,
    WebhookPayload, WorkflowActionInput, WorkflowActionOutcome,
};
use fm_core::types::review_loop::{ReviewLoopHistoryEntry, ReviewLoopRecord};
use fm_core::types::workflow::WorkflowRecord;
use fm_events::types::{EventRecord, EventSource};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::agents::launch,
        crate::routes::agents::list_agents,
        crate::routes::agents::get_agent,
        crate::routes::agents::follow_up,
        crate::routes::agents::cancel,
        crate::routes::agents::archive,
        crate::routes::agents::delete_agent,
        crate::routes::workflows::get_workflow,
        crate::routes::workflows::handle_action,
        crate::routes::review_loops::get_review_loop,
        crate::routes::review_loops::history,
        crate::routes::webhooks::ingest,
        crate::routes::events::list_events,
        crate::routes::events::subscribe
    ),
    components(schemas(
        AgentRecord,
        Origin,
        WorkflowRecord,
        ReviewLoopRecord,
        ReviewLoopHistoryEntry,
        LaunchInput,
        LaunchOutcome,
        WorkflowActionInput,
        WorkflowActionOutcome,
        FollowUpInput,
        AgentFilter,
        ArchiveInput,
        WebhookEvent,
        WebhookPayload,
        WebhookAck,
        SweepStats,
        EventRecord,
        EventsQuery,
        AgentId,
        WorkflowId,
        ReviewLoopId,
        AgentRole,
        AgentStatus,
        WorkflowPhase,
        WorkflowAction,
        ReviewLoopPhase,
        ReviewVerdict,
        EventSource
    ))
)]
struct ApiDoc;

pub fn generate_spec() -> String {
    ApiDoc::openapi()
        .to_json()
        .unwrap_or_else(|_| "{}".to_string())
}

pub fn ensure_initialized() {
    let _ = ApiDoc::openapi();
}

pub fn router() -> Router {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
