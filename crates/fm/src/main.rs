use clap::{Parser, Subcommand};
use fm_clients::{AgentApi, CodeHost, HttpAgentApi, HttpCodeHost};
use fm_core::ForemanConfig;
use fm_core::deliveries::DeliveryRepository;
use fm_core::store::Store;
use fm_events::bus::EventBus;
use fm_serve::poller::{AlwaysLeader, PollerCounters};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fm")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Serve,
    Openapi,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve => serve().await,
        Command::Openapi => {
            let spec = fm_serve::openapi::generate_spec();
            println!("{spec}");
        }
    }
}

async fn serve() {
    fm_serve::openapi::ensure_initialized();
    let db_path =
        std::env::var("FOREMAN_DB_PATH").unwrap_or_else(|_| ".foreman/foreman.db".to_string());
    if let Some(parent) = Path::new(&db_path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let port = std::env::var("FOREMAN_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(4870);
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);

    let mut config = ForemanConfig::default();
    if let Ok(reviewer) = std::env::var("FOREMAN_REVIEWER") {
        if !reviewer.trim().is_empty() {
            config.reviewer = reviewer;
        }
    }
    if let Some(max) = std::env::var("FOREMAN_MAX_REVIEW_ITERATIONS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        config.max_review_iterations = max;
    }
    let poll_interval = std::env::var("FOREMAN_POLL_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(fm_serve::poller::DEFAULT_POLL_INTERVAL_SECS);

    let state = fm_serve::AppState {
        db_path: db_path.clone(),
        event_bus: EventBus::new(1024),
        config,
        agent_api: agent_api_from_env(),
        code_host: code_host_from_env(),
    };
    if state.agent_api.is_none() {
        warn!("FOREMAN_AGENT_API_URL not set; agents cannot be launched or polled");
    }
    if state.code_host.is_none() {
        warn!("FOREMAN_CODE_HOST_API not set; review loops will fail at the review request");
    }

    let _ = cleanup_deliveries(&db_path);

    let poll_state = state.clone();
    let counters = Arc::new(PollerCounters::default());
    tokio::spawn(async move {
        fm_serve::poller::run(
            poll_state,
            Duration::from_secs(poll_interval),
            Arc::new(AlwaysLeader),
            counters,
        )
        .await;
    });

    info!(%addr, db_path = %db_path, "listening");
    if let Err(err) = fm_serve::serve(state, addr).await {
        eprintln!("serve error: {err}");
    }
}

fn agent_api_from_env() -> Option<Arc<dyn AgentApi>> {
    let url = std::env::var("FOREMAN_AGENT_API_URL").ok()?;
    let token = std::env::var("FOREMAN_AGENT_API_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty())?;
    match HttpAgentApi::new(url, token) {
        Ok(api) => Some(Arc::new(api)),
        Err(err) => {
            warn!(error = %err, "agent api client not built");
            None
        }
    }
}

fn code_host_from_env() -> Option<Arc<dyn CodeHost>> {
    let api_base = std::env::var("FOREMAN_CODE_HOST_API").ok()?;
    let token = std::env::var("FOREMAN_CODE_HOST_TOKEN")
        .ok()
        .filter(|token| !token.trim().is_empty())?;
    match HttpCodeHost::new(api_base, token) {
        Ok(host) => Some(Arc::new(host)),
        Err(err) => {
            warn!(error = %err, "code host client not built");
            None
        }
    }
}

fn cleanup_deliveries(path: &str) -> Result<(), String> {
    let conn = fm_db::schema::open_and_migrate(path).map_err(|err| err.to_string())?;
    let store = fm_db::DbStore::new(conn);
    let _ = store.deliveries().cleanup(chrono::Utc::now());
    Ok(())
}
