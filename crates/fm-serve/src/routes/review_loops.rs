use crate::middleware::correlation::CorrelationId;
use crate::routes::error::map_error;
use crate::{AppState, build_foreman};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use fm_core::error::ReviewLoopError;
use fm_core::types::{ReviewLoopHistoryEntry, ReviewLoopId, ReviewLoopRecord};
use std::str::FromStr;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/review-loops/{id}", get(get_review_loop))
        .route("/review-loops/{id}/history", get(history))
        .with_state(state)
}

fn parse_id(id: &str, correlation_id: &CorrelationId) -> Result<ReviewLoopId, Response> {
    ReviewLoopId::from_str(id).map_err(|err| {
        map_error(
            &fm_core::ForemanError::ReviewLoop(ReviewLoopError::InvalidInput {
                message: err.to_string(),
            }),
            Some(correlation_id.0.clone()),
        )
        .into_response()
    })
}

#[utoipa::path(
    get,
    path = "/api/review-loops/{id}",
    params(("id" = String, Path, description = "Review loop ID")),
    responses((status = 200, body = ReviewLoopRecord))
)]
pub(crate) async fn get_review_loop(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let loop_id = match parse_id(&id, &correlation) {
        Ok(value) => value,
        Err(response) => return response,
    };
    match foreman.review_loops().get(&loop_id) {
        Ok(record) => Json(record).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/review-loops/{id}/history",
    params(("id" = String, Path, description = "Review loop ID")),
    responses((status = 200, body = Vec<ReviewLoopHistoryEntry>))
)]
pub(crate) async fn history(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Path(id): Path<String>,
) -> Response {
    let foreman = match build_foreman(&state) {
        Ok(foreman) => foreman,
        Err(err) => return map_error(&err, Some(correlation.0)).into_response(),
    };
    let loop_id = match parse_id(&id, &correlation) {
        Ok(value) => value,
        Err(response) => return response,
    };
    match foreman.review_loops().history(&loop_id) {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => map_error(&err, Some(correlation.0)).into_response(),
    }
}
