use crate::{AppState, build_foreman};
use fm_core::RequestContext;
use fm_events::types::EventSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Gate for running the sweep when several replicas share a database. The
/// single-process deployment uses [`AlwaysLeader`].
pub trait LeaderGate: Send + Sync {
    fn is_leader(&self) -> bool;
}

pub struct AlwaysLeader;

impl LeaderGate for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }
}

/// Cumulative sweep counters, owned by the poller task and readable from
/// anywhere that holds the Arc.
#[derive(Debug, Default)]
pub struct PollerCounters {
    pub ticks: AtomicU64,
    pub checked: AtomicU64,
    pub updated: AtomicU64,
    pub failed: AtomicU64,
}

pub async fn run(
    state: AppState,
    interval: Duration,
    gate: Arc<dyn LeaderGate>,
    counters: Arc<PollerCounters>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if !gate.is_leader() {
            continue;
        }
        let foreman = match build_foreman(&state) {
            Ok(foreman) => foreman,
            Err(err) => {
                warn!(error = %err, "poller could not open store, skipping tick");
                continue;
            }
        };
        let ctx = RequestContext::new(EventSource::Poller, None);
        match foreman.agents().reconcile(&ctx).await {
            Ok(stats) => {
                counters.ticks.fetch_add(1, Ordering::Relaxed);
                counters.checked.fetch_add(stats.checked, Ordering::Relaxed);
                counters.updated.fetch_add(stats.updated, Ordering::Relaxed);
                counters.failed.fetch_add(stats.failed, Ordering::Relaxed);
                if stats.updated > 0 || stats.failed > 0 {
                    debug!(
                        checked = stats.checked,
                        updated = stats.updated,
                        failed = stats.failed,
                        "reconcile sweep"
                    );
                }
            }
            Err(err) => {
                counters.ticks.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "reconcile sweep failed");
            }
        }
    }
}
