pub mod agents;
pub mod error;
pub mod events;
pub mod review_loops;
pub mod webhooks;
pub mod workflows;

use crate::middleware::correlation::correlation_middleware;
use crate::{AppState, openapi};
use axum::Router;
use axum::middleware;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(agents::router(state.clone()))
        .merge(workflows::router(state.clone()))
        .merge(review_loops::router(state.clone()))
        .merge(webhooks::router(state.clone()))
        .merge(events::router(state.clone()))
        .merge(openapi::router())
        .route_layer(middleware::from_fn(correlation_middleware));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
