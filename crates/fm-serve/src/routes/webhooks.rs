use crate::middleware::correlation::CorrelationId;
use crate::routes::error::map_error;
use crate::{AppState, build_foreman};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use fm_core::RequestContext;
use fm_core::types::io::WebhookEvent;
use fm_events::types::EventSource;
use utoipa::ToSchema;

/// `accepted` is false for duplicate deliveries and untracked PRs. Both get
/// a 200 so the code host does not retry them.
#[derive(Debug, serde::Serialize, ToSchema)]
pub struct WebhookAck {
    pub accepted: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/code-host", post(ingest))
        .with_state(state)
}

#[utoipa::path(
    post,
    path = "/api/webhooks/code-host",
    request_body = WebhookEvent,
    responses((status = 200, body = WebhookAck))
)]
pub(crate) async fn ingest(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Json(event): Json<WebhookEvent>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let ctx = RequestContext::new(EventSource::Webhook, Some(correlation.0.clone()));
    match foreman.webhooks().ingest(&ctx, event).await {
        Ok(accepted) => Json(WebhookAck { accepted }).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}
