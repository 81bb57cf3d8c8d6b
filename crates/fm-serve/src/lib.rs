pub mod middleware;
pub mod openapi;
pub mod poller;
pub mod routes;
pub mod sse;

use axum::Router;
use axum::http::Request;
use fm_clients::{AgentApi, CodeHost};
use fm_core::{Foreman, ForemanConfig, ForemanError};
use fm_db::schema;
use fm_db::store::DbStore;
use fm_events::bus::EventBus;
use middleware::correlation::CorrelationId;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    pub db_path: String,
    pub event_bus: EventBus,
    pub config: ForemanConfig,
    pub agent_api: Option<Arc<dyn AgentApi>>,
    pub code_host: Option<Arc<dyn CodeHost>>,
}

/// Opens a fresh connection per request; SQLite in WAL mode handles the
/// concurrency, and nothing long-lived holds a connection across awaits.
pub fn build_foreman(state: &AppState) -> Result<Foreman<DbStore>, ForemanError> {
    let conn = schema::open_and_migrate(&state.db_path).map_err(|err| ForemanError::Internal {
        message: err.to_string(),
    })?;
    let store = DbStore::new(conn);
    let mut foreman = Foreman::new(store, state.event_bus.clone(), state.config.clone());
    if let Some(api) = &state.agent_api {
        foreman = foreman.with_agent_api(api.clone());
    }
    if let Some(host) = &state.code_host {
        foreman = foreman.with_code_host(host.clone());
    }
    Ok(foreman)
}

pub fn correlation_id_from_request<B>(request: &Request<B>) -> Option<String> {
    request
        .extensions()
        .get::<CorrelationId>()
        .map(|value| value.0.clone())
}

pub fn app(state: AppState) -> Router {
    routes::router(state)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await
}
