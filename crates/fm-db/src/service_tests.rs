use crate::schema::with_test_db;
use crate::store::DbStore;
use async_trait::async_trait;
use fm_clients::{
    AgentApi, AgentPage, AgentSnapshot, ClientError, CodeHost, LaunchRequest, PrRef, RemoteStatus,
    ReviewSummary, ReviewerComment,
};
use fm_core::agents::AgentRepository;
use fm_core::foreman::{Foreman, ForemanConfig, RequestContext};
use fm_core::normalize::normalize_pr_url;
use fm_core::review_loops::ReviewLoopRepository;
use fm_core::store::Store;
use fm_core::types::agent::Origin;
use fm_core::types::enums::{
    AgentStatus, ReviewLoopPhase, ReviewVerdict, WorkflowAction, WorkflowPhase,
};
use fm_core::types::event::EventBody;
use fm_core::types::ids::AgentId;
use fm_core::types::io::{
    FollowUpInput, LaunchInput, LaunchOutcome, WebhookEvent, WebhookPayload, WorkflowActionInput,
};
use fm_core::{ForemanError, error::AgentError};
use fm_events::bus::EventBus;
use fm_events::types::EventSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

const PR_URL: &str = "https://github.com/acme/widgets/pull/7";

#[derive(Default)]
struct FakeAgentApi {
    next_id: AtomicU32,
    snapshots: Mutex<HashMap<String, AgentSnapshot>>,
    launches: Mutex<Vec<LaunchRequest>>,
    follow_ups: Mutex<Vec<(String, String)>>,
}

impl FakeAgentApi {
    fn finish(&self, id: &str, pr_url: Option<&str>, summary: Option<&str>) {
        let mut snapshots = self.snapshots.lock().unwrap();
        let snapshot = snapshots.get_mut(id).unwrap();
        snapshot.status = RemoteStatus::Finished;
        if pr_url.is_some() {
            snapshot.pr_url = pr_url.map(str::to_string);
        }
        if summary.is_some() {
            snapshot.summary = summary.map(str::to_string);
        }
    }

    fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    fn follow_up_count(&self) -> usize {
        self.follow_ups.lock().unwrap().len()
    }
}

#[async_trait]
impl AgentApi for FakeAgentApi {
    async fn launch(&self, request: &LaunchRequest) -> Result<AgentSnapshot, ClientError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = AgentSnapshot {
            id: format!("bc-{n}"),
            status: RemoteStatus::Running,
            pr_url: None,
            summary: None,
        };
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.id.clone(), snapshot.clone());
        self.launches.lock().unwrap().push(request.clone());
        Ok(snapshot)
    }

    async fn get(&self, id: &str) -> Result<AgentSnapshot, ClientError> {
        self.snapshots
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(ClientError::Api {
                status: 404,
                message: "unknown agent".to_string(),
            })
    }

    async fn follow_up(&self, id: &str, text: &str) -> Result<(), ClientError> {
        self.follow_ups
            .lock()
            .unwrap()
            .push((id.to_string(), text.to_string()));
        if let Some(snapshot) = self.snapshots.lock().unwrap().get_mut(id) {
            snapshot.status = RemoteStatus::Running;
        }
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), ClientError> {
        if let Some(snapshot) = self.snapshots.lock().unwrap().get_mut(id) {
            snapshot.status = RemoteStatus::Stopped;
        }
        Ok(())
    }

    async fn list(&self, _cursor: Option<&str>) -> Result<AgentPage, ClientError> {
        Ok(AgentPage {
            agents: self.snapshots.lock().unwrap().values().cloned().collect(),
            next_cursor: None,
        })
    }
}

#[derive(Default)]
struct FakeCodeHost {
    ready_calls: Mutex<Vec<PrRef>>,
    reviewer_requests: Mutex<Vec<(PrRef, String)>>,
}

impl FakeCodeHost {
    fn reviewer_request_count(&self) -> usize {
        self.reviewer_requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CodeHost for FakeCodeHost {
    async fn mark_ready_for_review(&self, pr: &PrRef) -> Result<(), ClientError> {
        self.ready_calls.lock().unwrap().push(pr.clone());
        Ok(())
    }

    async fn request_reviewer(&self, pr: &PrRef, reviewer: &str) -> Result<(), ClientError> {
        self.reviewer_requests
            .lock()
            .unwrap()
            .push((pr.clone(), reviewer.to_string()));
        Ok(())
    }

    async fn post_comment(&self, _pr: &PrRef, _body: &str) -> Result<(), ClientError> {
        Ok(())
    }

    async fn list_reviews(&self, _pr: &PrRef) -> Result<Vec<ReviewSummary>, ClientError> {
        Ok(Vec::new())
    }

    async fn list_review_comments(
        &self,
        _pr: &PrRef,
    ) -> Result<Vec<ReviewerComment>, ClientError> {
        Ok(Vec::new())
    }

    async fn find_pr_by_branch(
        &self,
        _owner: &str,
        _repo: &str,
        _branch: &str,
    ) -> Result<Option<String>, ClientError> {
        Ok(None)
    }
}

struct Harness {
    foreman: Foreman<DbStore>,
    agent_api: Arc<FakeAgentApi>,
    code_host: Arc<FakeCodeHost>,
}

fn harness() -> Harness {
    let store = DbStore::new(with_test_db().unwrap());
    let agent_api = Arc::new(FakeAgentApi::default());
    let code_host = Arc::new(FakeCodeHost::default());
    let config = ForemanConfig {
        reviewer: "review-bot".to_string(),
        max_review_iterations: 3,
        delivery_retention_secs: 3600,
    };
    let foreman = Foreman::new(store, EventBus::new(64), config)
        .with_agent_api(agent_api.clone())
        .with_code_host(code_host.clone());
    Harness {
        foreman,
        agent_api,
        code_host,
    }
}

fn ctx() -> RequestContext {
    RequestContext::new(EventSource::Rest, None)
}

fn origin() -> Origin {
    Origin {
        channel_id: "ch1".to_string(),
        post_id: "p1".to_string(),
        user_id: "u1".to_string(),
    }
}

fn launch_input(hitl: bool) -> LaunchInput {
    LaunchInput {
        prompt: "add retries to the uploader".to_string(),
        repo: "acme/widgets".to_string(),
        branch: Some("agent/fix-42".to_string()),
        target_branch: None,
        model: None,
        origin: origin(),
        hitl,
        skip_context_review: false,
        skip_plan_review: false,
    }
}

fn action(expected: WorkflowPhase, act: WorkflowAction) -> WorkflowActionInput {
    WorkflowActionInput {
        expected_phase: expected,
        action: act,
        feedback: None,
    }
}

fn event_bodies(foreman: &Foreman<DbStore>) -> Vec<EventBody> {
    foreman
        .events()
        .list(None, None)
        .unwrap()
        .into_iter()
        .map(|record| serde_json::from_value(record.body).unwrap())
        .collect()
}

fn workflow_phase_events(
    foreman: &Foreman<DbStore>,
) -> Vec<(Option<WorkflowPhase>, WorkflowPhase)> {
    event_bodies(foreman)
        .into_iter()
        .filter_map(|body| match body {
            EventBody::WorkflowPhaseChanged { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect()
}

fn review_webhook(delivery_id: &str, verdict: ReviewVerdict) -> WebhookEvent {
    WebhookEvent {
        delivery_id: delivery_id.to_string(),
        pr_url: Some(PR_URL.to_string()),
        branch: Some("agent/fix-42".to_string()),
        payload: WebhookPayload::ReviewSubmitted {
            reviewer: "review-bot".to_string(),
            verdict,
            body: Some("see comments".to_string()),
        },
    }
}

/// Drives a standalone agent to a finished PR and its loop to AwaitingReview.
async fn tracked_loop(h: &Harness) -> (AgentId, fm_core::types::ids::ReviewLoopId) {
    let outcome = h
        .foreman
        .agents()
        .launch(&ctx(), launch_input(false))
        .await
        .unwrap();
    let LaunchOutcome::Agent(agent) = outcome else {
        panic!("expected a direct agent launch");
    };
    h.agent_api
        .finish(agent.id.as_str(), Some(PR_URL), Some("opened a PR"));
    h.foreman.agents().reconcile(&ctx()).await.unwrap();
    let record = h
        .foreman
        .store()
        .review_loops()
        .find_by_pr_url(&normalize_pr_url(PR_URL))
        .unwrap()
        .unwrap();
    assert_eq!(record.phase, ReviewLoopPhase::AwaitingReview);
    (agent.id, record.id)
}

#[tokio::test]
async fn full_hitl_path_emits_five_ordered_notifications() {
    let h = harness();
    let outcome = h
        .foreman
        .agents()
        .launch(&ctx(), launch_input(true))
        .await
        .unwrap();
    let LaunchOutcome::Workflow(workflow) = outcome else {
        panic!("expected a workflow launch");
    };
    assert_eq!(workflow.phase, WorkflowPhase::ContextReview);
    assert_eq!(h.agent_api.launch_count(), 0);

    let outcome = h
        .foreman
        .workflows()
        .handle_action(
            &ctx(),
            &workflow.id,
            action(WorkflowPhase::ContextReview, WorkflowAction::Accept),
        )
        .await
        .unwrap();
    assert!(!outcome.stale);
    assert_eq!(outcome.workflow.phase, WorkflowPhase::Planning);
    let planner_id = outcome.workflow.planner_agent_id.clone().unwrap();
    assert_eq!(h.agent_api.launch_count(), 1);

    h.agent_api
        .finish(planner_id.as_str(), None, Some("1. add a retry module"));
    h.foreman.agents().reconcile(&ctx()).await.unwrap();
    let current = h.foreman.workflows().get(&workflow.id).unwrap();
    assert_eq!(current.phase, WorkflowPhase::PlanReview);
    assert_eq!(current.plan.as_deref(), Some("1. add a retry module"));

    let outcome = h
        .foreman
        .workflows()
        .handle_action(
            &ctx(),
            &workflow.id,
            action(WorkflowPhase::PlanReview, WorkflowAction::Accept),
        )
        .await
        .unwrap();
    assert_eq!(outcome.workflow.phase, WorkflowPhase::Implementing);
    let implementer_id = outcome.workflow.implementer_agent_id.clone().unwrap();
    assert_eq!(h.agent_api.launch_count(), 2);

    h.agent_api
        .finish(implementer_id.as_str(), Some(PR_URL), Some("done"));
    h.foreman.agents().reconcile(&ctx()).await.unwrap();
    let current = h.foreman.workflows().get(&workflow.id).unwrap();
    assert_eq!(current.phase, WorkflowPhase::Complete);

    let phases = workflow_phase_events(&h.foreman);
    assert_eq!(
        phases,
        vec![
            (None, WorkflowPhase::ContextReview),
            (Some(WorkflowPhase::ContextReview), WorkflowPhase::Planning),
            (Some(WorkflowPhase::Planning), WorkflowPhase::PlanReview),
            (Some(WorkflowPhase::PlanReview), WorkflowPhase::Implementing),
            (Some(WorkflowPhase::Implementing), WorkflowPhase::Complete),
        ]
    );

    // The finished PR entered the review loop.
    assert_eq!(h.code_host.reviewer_request_count(), 1);
}

#[tokio::test]
async fn duplicate_accept_is_a_stale_noop() {
    let h = harness();
    let LaunchOutcome::Workflow(workflow) = h
        .foreman
        .agents()
        .launch(&ctx(), launch_input(true))
        .await
        .unwrap()
    else {
        panic!("expected a workflow launch");
    };
    let input = action(WorkflowPhase::ContextReview, WorkflowAction::Accept);
    let first = h
        .foreman
        .workflows()
        .handle_action(&ctx(), &workflow.id, input.clone())
        .await
        .unwrap();
    assert!(!first.stale);

    let second = h
        .foreman
        .workflows()
        .handle_action(&ctx(), &workflow.id, input)
        .await
        .unwrap();
    assert!(second.stale);
    assert_eq!(second.workflow.phase, WorkflowPhase::Planning);
    assert_eq!(h.agent_api.launch_count(), 1);
}

#[tokio::test]
async fn plan_rejection_with_feedback_replans() {
    let h = harness();
    let LaunchOutcome::Workflow(workflow) = h
        .foreman
        .agents()
        .launch(&ctx(), launch_input(true))
        .await
        .unwrap()
    else {
        panic!("expected a workflow launch");
    };
    h.foreman
        .workflows()
        .handle_action(
            &ctx(),
            &workflow.id,
            action(WorkflowPhase::ContextReview, WorkflowAction::Accept),
        )
        .await
        .unwrap();
    let planner_id = h
        .foreman
        .workflows()
        .get(&workflow.id)
        .unwrap()
        .planner_agent_id
        .unwrap();
    h.agent_api
        .finish(planner_id.as_str(), None, Some("plan v1"));
    h.foreman.agents().reconcile(&ctx()).await.unwrap();

    let outcome = h
        .foreman
        .workflows()
        .handle_action(
            &ctx(),
            &workflow.id,
            WorkflowActionInput {
                expected_phase: WorkflowPhase::PlanReview,
                action: WorkflowAction::Reject,
                feedback: Some("split the migration into two steps".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.workflow.phase, WorkflowPhase::Planning);
    assert_eq!(outcome.workflow.plan_iteration_count, 1);
    assert!(outcome.workflow.plan.is_none());
    assert_eq!(h.agent_api.follow_up_count(), 1);
    // Same planner, no second launch.
    assert_eq!(h.agent_api.launch_count(), 1);

    let revisions: Vec<u32> = event_bodies(&h.foreman)
        .into_iter()
        .filter_map(|body| match body {
            EventBody::PlanRevisionRequested { iteration, .. } => Some(iteration),
            _ => None,
        })
        .collect();
    assert_eq!(revisions, vec![1]);

    // The revised plan comes back around to review.
    h.agent_api
        .finish(planner_id.as_str(), None, Some("plan v2"));
    h.foreman.agents().reconcile(&ctx()).await.unwrap();
    let current = h.foreman.workflows().get(&workflow.id).unwrap();
    assert_eq!(current.phase, WorkflowPhase::PlanReview);
    assert_eq!(current.plan.as_deref(), Some("plan v2"));
}

#[tokio::test]
async fn plan_rejection_without_feedback_terminates() {
    let h = harness();
    let LaunchOutcome::Workflow(workflow) = h
        .foreman
        .agents()
        .launch(&ctx(), launch_input(true))
        .await
        .unwrap()
    else {
        panic!("expected a workflow launch");
    };
    let outcome = h
        .foreman
        .workflows()
        .handle_action(
            &ctx(),
            &workflow.id,
            action(WorkflowPhase::ContextReview, WorkflowAction::Reject),
        )
        .await
        .unwrap();
    assert_eq!(outcome.workflow.phase, WorkflowPhase::Rejected);
}

#[tokio::test]
async fn skipped_gates_shorten_the_path() {
    let h = harness();
    let mut input = launch_input(true);
    input.skip_context_review = true;
    input.skip_plan_review = true;
    let LaunchOutcome::Workflow(workflow) =
        h.foreman.agents().launch(&ctx(), input).await.unwrap()
    else {
        panic!("expected a workflow launch");
    };
    assert_eq!(workflow.phase, WorkflowPhase::Planning);
    let planner_id = workflow.planner_agent_id.clone().unwrap();

    h.agent_api.finish(planner_id.as_str(), None, Some("plan"));
    h.foreman.agents().reconcile(&ctx()).await.unwrap();
    let current = h.foreman.workflows().get(&workflow.id).unwrap();
    assert_eq!(current.phase, WorkflowPhase::Implementing);
    let implementer_id = current.implementer_agent_id.unwrap();

    h.agent_api
        .finish(implementer_id.as_str(), Some(PR_URL), None);
    h.foreman.agents().reconcile(&ctx()).await.unwrap();
    let current = h.foreman.workflows().get(&workflow.id).unwrap();
    assert_eq!(current.phase, WorkflowPhase::Complete);
}

#[tokio::test]
async fn review_loop_parks_after_third_fix_cycle() {
    let h = harness();
    let (agent_id, loop_id) = tracked_loop(&h).await;
    assert_eq!(h.code_host.reviewer_request_count(), 1);

    for round in 1..=3_u32 {
        let delivery = format!("d-cr-{round}");
        let processed = h
            .foreman
            .webhooks()
            .ingest(&ctx(), review_webhook(&delivery, ReviewVerdict::ChangesRequested))
            .await
            .unwrap();
        assert!(processed);
        let record = h.foreman.review_loops().get(&loop_id).unwrap();
        assert_eq!(record.phase, ReviewLoopPhase::Fixing);
        assert_eq!(record.iteration, round);

        h.agent_api.finish(agent_id.as_str(), None, None);
        h.foreman.agents().reconcile(&ctx()).await.unwrap();
        let record = h.foreman.review_loops().get(&loop_id).unwrap();
        if round < 3 {
            assert_eq!(record.phase, ReviewLoopPhase::AwaitingReview);
        } else {
            assert_eq!(record.phase, ReviewLoopPhase::MaxIterations);
        }
    }

    // Three fix follow-ups, and no fourth reviewer request.
    assert_eq!(h.agent_api.follow_up_count(), 3);
    assert_eq!(h.code_host.reviewer_request_count(), 3);

    let exhausted: Vec<u32> = event_bodies(&h.foreman)
        .into_iter()
        .filter_map(|body| match body {
            EventBody::ReviewLoopExhausted { iterations, .. } => Some(iterations),
            _ => None,
        })
        .collect();
    assert_eq!(exhausted, vec![3]);

    // Final phases admit nothing further.
    let late = h
        .foreman
        .webhooks()
        .ingest(&ctx(), review_webhook("d-late", ReviewVerdict::ChangesRequested))
        .await
        .unwrap();
    assert!(late);
    let record = h.foreman.review_loops().get(&loop_id).unwrap();
    assert_eq!(record.phase, ReviewLoopPhase::MaxIterations);
    assert_eq!(record.iteration, 3);
}

#[tokio::test]
async fn duplicate_delivery_is_discarded() {
    let h = harness();
    let (_, loop_id) = tracked_loop(&h).await;

    let event = review_webhook("d-dup", ReviewVerdict::ChangesRequested);
    assert!(h.foreman.webhooks().ingest(&ctx(), event.clone()).await.unwrap());
    assert!(!h.foreman.webhooks().ingest(&ctx(), event).await.unwrap());

    let record = h.foreman.review_loops().get(&loop_id).unwrap();
    assert_eq!(record.iteration, 1);
    let history = h.foreman.review_loops().history(&loop_id).unwrap();
    let fixing = history
        .iter()
        .filter(|entry| entry.phase == ReviewLoopPhase::Fixing)
        .count();
    assert_eq!(fixing, 1);
    assert_eq!(h.agent_api.follow_up_count(), 1);
}

#[tokio::test]
async fn pr_comment_is_recorded_without_a_transition() {
    let h = harness();
    let (_, loop_id) = tracked_loop(&h).await;
    let events_before = event_bodies(&h.foreman).len();
    let history_before = h.foreman.review_loops().history(&loop_id).unwrap().len();

    let accepted = h
        .foreman
        .webhooks()
        .ingest(
            &ctx(),
            WebhookEvent {
                delivery_id: "d-comment".to_string(),
                pr_url: Some(PR_URL.to_string()),
                branch: Some("agent/fix-42".to_string()),
                payload: WebhookPayload::CommentCreated {
                    author: "alice".to_string(),
                    body: "looks odd around line 40".to_string(),
                },
            },
        )
        .await
        .unwrap();
    assert!(accepted);

    let record = h.foreman.review_loops().get(&loop_id).unwrap();
    assert_eq!(record.phase, ReviewLoopPhase::AwaitingReview);
    let history = h.foreman.review_loops().history(&loop_id).unwrap();
    assert_eq!(history.len(), history_before + 1);
    let entry = history.last().unwrap();
    assert_eq!(entry.phase, ReviewLoopPhase::AwaitingReview);
    assert_eq!(entry.detail, "comment by alice");
    assert_eq!(event_bodies(&h.foreman).len(), events_before);
}

#[tokio::test]
async fn untracked_pr_webhook_is_discarded() {
    let h = harness();
    let mut event = review_webhook("d-unknown", ReviewVerdict::Approved);
    event.pr_url = Some("https://github.com/acme/other/pull/1".to_string());
    event.branch = Some("unrelated".to_string());
    assert!(!h.foreman.webhooks().ingest(&ctx(), event).await.unwrap());
}

#[tokio::test]
async fn approval_then_merge_completes_the_loop() {
    let h = harness();
    let (_, loop_id) = tracked_loop(&h).await;

    h.foreman
        .webhooks()
        .ingest(&ctx(), review_webhook("d-approve", ReviewVerdict::Approved))
        .await
        .unwrap();
    assert_eq!(
        h.foreman.review_loops().get(&loop_id).unwrap().phase,
        ReviewLoopPhase::Approved
    );

    h.foreman
        .webhooks()
        .ingest(
            &ctx(),
            WebhookEvent {
                delivery_id: "d-merge".to_string(),
                pr_url: Some(PR_URL.to_string()),
                branch: None,
                payload: WebhookPayload::PrClosed { merged: true },
            },
        )
        .await
        .unwrap();
    assert_eq!(
        h.foreman.review_loops().get(&loop_id).unwrap().phase,
        ReviewLoopPhase::Complete
    );
}

#[tokio::test]
async fn comment_only_review_escalates_to_a_human() {
    let h = harness();
    let (_, loop_id) = tracked_loop(&h).await;
    h.foreman
        .webhooks()
        .ingest(&ctx(), review_webhook("d-comment", ReviewVerdict::Commented))
        .await
        .unwrap();
    assert_eq!(
        h.foreman.review_loops().get(&loop_id).unwrap().phase,
        ReviewLoopPhase::HumanReview
    );
}

#[tokio::test]
async fn close_without_merge_fails_the_loop() {
    let h = harness();
    let (_, loop_id) = tracked_loop(&h).await;
    h.foreman
        .webhooks()
        .ingest(
            &ctx(),
            WebhookEvent {
                delivery_id: "d-close".to_string(),
                pr_url: Some(PR_URL.to_string()),
                branch: None,
                payload: WebhookPayload::PrClosed { merged: false },
            },
        )
        .await
        .unwrap();
    assert_eq!(
        h.foreman.review_loops().get(&loop_id).unwrap().phase,
        ReviewLoopPhase::Failed
    );
}

#[tokio::test]
async fn unchanged_remote_status_writes_nothing() {
    let h = harness();
    let LaunchOutcome::Agent(_) = h
        .foreman
        .agents()
        .launch(&ctx(), launch_input(false))
        .await
        .unwrap()
    else {
        panic!("expected a direct agent launch");
    };
    let before = h.foreman.events().list(None, None).unwrap().len();

    let stats = h.foreman.agents().reconcile(&ctx()).await.unwrap();
    assert_eq!(stats.checked, 1);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(h.foreman.events().list(None, None).unwrap().len(), before);
}

#[tokio::test]
async fn follow_up_on_finished_agent_is_rejected_without_api_call() {
    let h = harness();
    let LaunchOutcome::Agent(agent) = h
        .foreman
        .agents()
        .launch(&ctx(), launch_input(false))
        .await
        .unwrap()
    else {
        panic!("expected a direct agent launch");
    };
    h.agent_api.finish(agent.id.as_str(), None, None);
    h.foreman.agents().reconcile(&ctx()).await.unwrap();

    let result = h
        .foreman
        .agents()
        .follow_up(
            &ctx(),
            &agent.id,
            FollowUpInput {
                message: "also fix the logging".to_string(),
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(ForemanError::Agent(AgentError::IllegalState {
            status: AgentStatus::Finished
        }))
    ));
    assert_eq!(h.agent_api.follow_up_count(), 0);
}

#[tokio::test]
async fn cancel_stops_polling_and_rejects_owning_workflow() {
    let h = harness();
    let LaunchOutcome::Workflow(workflow) = h
        .foreman
        .agents()
        .launch(&ctx(), launch_input(true))
        .await
        .unwrap()
    else {
        panic!("expected a workflow launch");
    };
    h.foreman
        .workflows()
        .handle_action(
            &ctx(),
            &workflow.id,
            action(WorkflowPhase::ContextReview, WorkflowAction::Accept),
        )
        .await
        .unwrap();
    let planner_id = h
        .foreman
        .workflows()
        .get(&workflow.id)
        .unwrap()
        .planner_agent_id
        .unwrap();

    let cancelled = h.foreman.agents().cancel(&ctx(), &planner_id).await.unwrap();
    assert_eq!(cancelled.status, AgentStatus::Stopped);
    assert!(h.foreman.store().agents().list_active().unwrap().is_empty());
    assert_eq!(
        h.foreman.workflows().get(&workflow.id).unwrap().phase,
        WorkflowPhase::Rejected
    );

    let stats = h.foreman.agents().reconcile(&ctx()).await.unwrap();
    assert_eq!(stats.checked, 0);
}

#[tokio::test]
async fn events_replay_from_a_sequence_cursor() {
    let h = harness();
    h.foreman
        .agents()
        .launch(&ctx(), launch_input(false))
        .await
        .unwrap();
    let all = h.foreman.events().list(None, None).unwrap();
    assert!(!all.is_empty());
    let after = h.foreman.events().list(Some(all[0].seq), None).unwrap();
    assert_eq!(after.len(), all.len() - 1);
}

#[tokio::test]
async fn service_calls_run_on_spawned_tasks() {
    let h = harness();
    let handle = tokio::spawn(async move {
        let outcome = h
            .foreman
            .agents()
            .launch(&ctx(), launch_input(false))
            .await
            .unwrap();
        let LaunchOutcome::Agent(agent) = outcome else {
            panic!("expected a direct agent launch");
        };
        h.foreman.agents().reconcile(&ctx()).await.unwrap();
        (h, agent.id)
    });
    let (h, agent_id) = handle.await.unwrap();
    let record = h.foreman.agents().get(&ctx(), &agent_id).await.unwrap();
    assert_eq!(record.status, AgentStatus::Running);
}
