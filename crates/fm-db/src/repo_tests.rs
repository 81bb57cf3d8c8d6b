use crate::schema::with_test_db;
use crate::store::DbStore;
use chrono::Utc;
use fm_core::agents::AgentRepository;
use fm_core::deliveries::DeliveryRepository;
use fm_core::events::EventRepository;
use fm_core::normalize::normalize_pr_url;
use fm_core::review_loops::ReviewLoopRepository;
use fm_core::store::Store;
use fm_core::types::agent::{AgentRecord, Origin};
use fm_core::types::enums::{AgentRole, AgentStatus, ReviewLoopPhase};
use fm_core::types::ids::{AgentId, ReviewLoopId};
use fm_core::types::io::AgentFilter;
use fm_core::types::review_loop::{ReviewLoopHistoryEntry, ReviewLoopRecord};
use fm_events::types::{EventRecord, EventSource};
use std::str::FromStr;

fn store() -> DbStore {
    DbStore::new(with_test_db().unwrap())
}

fn agent(id: &str, status: AgentStatus) -> AgentRecord {
    let now = Utc::now();
    AgentRecord {
        id: AgentId::from_str(id).unwrap(),
        origin: Origin {
            channel_id: "ch1".to_string(),
            post_id: "p1".to_string(),
            user_id: "u1".to_string(),
        },
        status,
        role: AgentRole::Standalone,
        repo: "acme/widgets".to_string(),
        branch: Some("agent/fix-42".to_string()),
        target_branch: None,
        prompt: "fix the bug".to_string(),
        model: None,
        pr_url: None,
        summary: None,
        workflow_id: None,
        review_loop_id: None,
        archived: false,
        created_at: now,
        updated_at: now,
    }
}

fn review_loop(pr_url: &str) -> ReviewLoopRecord {
    let now = Utc::now();
    ReviewLoopRecord {
        id: ReviewLoopId::generate(),
        agent_id: AgentId::from_str("bc-1").unwrap(),
        pr_url: pr_url.to_string(),
        branch: Some("agent/fix-42".to_string()),
        phase: ReviewLoopPhase::AwaitingReview,
        iteration: 0,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn agent_round_trips_through_save_and_get() {
    let store = store();
    let mut record = agent("bc-1", AgentStatus::Running);
    record.pr_url = Some("https://github.com/acme/widgets/pull/7".to_string());
    store.agents().save(&record).unwrap();
    let loaded = store.agents().get(&record.id).unwrap().unwrap();
    assert_eq!(loaded, record);
}

#[test]
fn missing_agent_is_none_not_error() {
    let store = store();
    let id = AgentId::from_str("bc-missing").unwrap();
    assert!(store.agents().get(&id).unwrap().is_none());
}

#[test]
fn active_index_tracks_terminal_status() {
    let store = store();
    let mut record = agent("bc-1", AgentStatus::Running);
    store.agents().save(&record).unwrap();
    assert_eq!(store.agents().list_active().unwrap().len(), 1);

    record.status = AgentStatus::Finished;
    store.agents().save(&record).unwrap();
    assert!(store.agents().list_active().unwrap().is_empty());

    // A follow-up reactivates the agent; the index row must come back.
    record.status = AgentStatus::Running;
    store.agents().save(&record).unwrap();
    assert_eq!(store.agents().list_active().unwrap().len(), 1);

    store.agents().delete(&record.id).unwrap();
    assert!(store.agents().list_active().unwrap().is_empty());
}

#[test]
fn list_filters_by_archived_and_user() {
    let store = store();
    let mut first = agent("bc-1", AgentStatus::Running);
    first.archived = true;
    store.agents().save(&first).unwrap();
    let mut second = agent("bc-2", AgentStatus::Running);
    second.origin.user_id = "u2".to_string();
    store.agents().save(&second).unwrap();

    let archived = store
        .agents()
        .list(&AgentFilter {
            archived: Some(true),
            user_id: None,
        })
        .unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id.as_str(), "bc-1");

    let by_user = store.agents().list_by_user("u2").unwrap();
    assert_eq!(by_user.len(), 1);
    assert_eq!(by_user[0].id.as_str(), "bc-2");
}

#[test]
fn review_loop_found_by_normalized_pr_url() {
    let store = store();
    let record = review_loop("https://github.com/Acme/Widgets/pull/7/");
    store.review_loops().save(&record).unwrap();

    let key = normalize_pr_url("https://github.com/acme/widgets/pull/7");
    let found = store.review_loops().find_by_pr_url(&key).unwrap().unwrap();
    assert_eq!(found.id, record.id);
}

#[test]
fn review_loop_found_by_normalized_branch() {
    let store = store();
    let record = review_loop("https://github.com/acme/widgets/pull/7");
    store.review_loops().save(&record).unwrap();

    let found = store
        .review_loops()
        .find_by_branch("agent/fix-42")
        .unwrap()
        .unwrap();
    assert_eq!(found.id, record.id);
    assert!(store.review_loops().find_by_branch("other").unwrap().is_none());
}

#[test]
fn history_is_append_only_and_ordered() {
    let store = store();
    let record = review_loop("https://github.com/acme/widgets/pull/7");
    store.review_loops().save(&record).unwrap();
    for (phase, detail) in [
        (ReviewLoopPhase::RequestingReview, "review requested"),
        (ReviewLoopPhase::AwaitingReview, "awaiting review"),
        (ReviewLoopPhase::Fixing, "changes requested"),
    ] {
        store
            .review_loops()
            .append_history(&ReviewLoopHistoryEntry {
                loop_id: record.id.clone(),
                phase,
                detail: detail.to_string(),
                at: Utc::now(),
            })
            .unwrap();
    }
    let history = store.review_loops().history(&record.id).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].phase, ReviewLoopPhase::RequestingReview);
    assert_eq!(history[2].phase, ReviewLoopPhase::Fixing);
}

#[test]
fn delivery_dedup_and_cleanup() {
    let store = store();
    let now = Utc::now();
    assert!(!store.deliveries().is_processed("d1").unwrap());
    store.deliveries().mark_processed("d1", now, 60).unwrap();
    assert!(store.deliveries().is_processed("d1").unwrap());

    // Marking again is harmless.
    store.deliveries().mark_processed("d1", now, 60).unwrap();

    let later = now + chrono::Duration::seconds(61);
    let removed = store.deliveries().cleanup(later).unwrap();
    assert_eq!(removed, 1);
    assert!(!store.deliveries().is_processed("d1").unwrap());
}

#[test]
fn events_get_sequential_numbers_and_replay_after() {
    let store = store();
    for n in 0..3 {
        let record = EventRecord {
            id: String::new(),
            seq: 0,
            at: Utc::now(),
            correlation_id: None,
            source: EventSource::Rest,
            body: serde_json::json!({ "n": n }),
        };
        let appended = store.events().append(record).unwrap();
        assert_eq!(appended.seq, n + 1);
    }
    let tail = store.events().list(Some(1), None).unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].seq, 2);

    let limited = store.events().list(None, Some(1)).unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].seq, 1);
}

#[test]
fn with_tx_rolls_back_on_error() {
    let store = store();
    let record = agent("bc-1", AgentStatus::Running);
    let result: Result<(), fm_core::ForemanError> = store.with_tx(|store| {
        store.agents().save(&record)?;
        Err(fm_core::ForemanError::Internal {
            message: "boom".to_string(),
        })
    });
    assert!(result.is_err());
    assert!(store.agents().get(&record.id).unwrap().is_none());
    assert!(store.agents().list_active().unwrap().is_empty());
}

#[test]
fn reopening_a_database_file_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fm.db");
    let path = path.to_str().unwrap();
    {
        let store = DbStore::new(crate::schema::open_and_migrate(path).unwrap());
        store
            .agents()
            .save(&agent("bc-1", AgentStatus::Running))
            .unwrap();
    }
    let store = DbStore::new(crate::schema::open_and_migrate(path).unwrap());
    let found = store
        .agents()
        .get(&AgentId::from_str("bc-1").unwrap())
        .unwrap();
    assert!(found.is_some());
    assert_eq!(store.agents().list_active().unwrap().len(), 1);
}
