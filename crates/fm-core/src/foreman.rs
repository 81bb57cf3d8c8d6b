use crate::agents::AgentRepository;
use crate::deliveries::DeliveryRepository;
use crate::error::{AgentError, ClientError, EventError, ForemanError, ReviewLoopError, WorkflowError};
use crate::events::EventRepository;
use crate::normalize::{normalize_branch, normalize_pr_url};
use crate::review_loops::ReviewLoopRepository;
use crate::store::Store;
use crate::transitions::{loop_can_advance, workflow_can_advance};
use crate::types::agent::{AgentRecord, Origin};
use crate::types::enums::{
    AgentRole, AgentStatus, ReviewLoopPhase, ReviewVerdict, WorkflowAction, WorkflowPhase,
};
use crate::types::event::EventBody;
use crate::types::ids::{AgentId, ReviewLoopId, WorkflowId};
use crate::types::io::{
    AgentFilter, FollowUpInput, LaunchInput, LaunchOutcome, SweepStats, WebhookEvent,
    WebhookPayload, WorkflowActionInput, WorkflowActionOutcome,
};
use crate::types::review_loop::{ReviewLoopHistoryEntry, ReviewLoopRecord};
use crate::types::workflow::WorkflowRecord;
use crate::workflows::WorkflowRepository;
use chrono::Utc;
use fm_clients::{AgentApi, AgentSnapshot, CodeHost, LaunchRequest, PrRef, RemoteStatus, RetryPolicy};
use fm_events::bus::EventBus;
use fm_events::types::{EventRecord, EventSource};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub source: EventSource,
    pub correlation_id: Option<String>,
}

impl RequestContext {
    pub fn new(source: EventSource, correlation_id: Option<String>) -> Self {
        Self {
            source,
            correlation_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForemanConfig {
    /// Login of the AI reviewer requested on every tracked PR.
    pub reviewer: String,
    /// Review/fix cycles allowed before a loop is parked in MaxIterations.
    pub max_review_iterations: u32,
    /// How long a processed webhook delivery id stays visible for dedup.
    pub delivery_retention_secs: u64,
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            reviewer: "foreman-reviewer".to_string(),
            max_review_iterations: 3,
            delivery_retention_secs: 24 * 60 * 60,
        }
    }
}

pub struct Foreman<S: Store> {
    store: S,
    event_bus: EventBus,
    config: ForemanConfig,
    retry: RetryPolicy,
    agent_api: Option<Arc<dyn AgentApi>>,
    code_host: Option<Arc<dyn CodeHost>>,
}

impl<S: Store> Foreman<S> {
    pub fn new(store: S, event_bus: EventBus, config: ForemanConfig) -> Self {
        Self {
            store,
            event_bus,
            config,
            retry: RetryPolicy::default(),
            agent_api: None,
            code_host: None,
        }
    }

    pub fn with_agent_api(mut self, api: Arc<dyn AgentApi>) -> Self {
        self.agent_api = Some(api);
        self
    }

    pub fn with_code_host(mut self, host: Arc<dyn CodeHost>) -> Self {
        self.code_host = Some(host);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn agents(&self) -> AgentsApi<'_, S> {
        AgentsApi { core: self }
    }

    pub fn workflows(&self) -> WorkflowsApi<'_, S> {
        WorkflowsApi { core: self }
    }

    pub fn review_loops(&self) -> ReviewLoopsApi<'_, S> {
        ReviewLoopsApi { core: self }
    }

    pub fn webhooks(&self) -> WebhooksApi<'_, S> {
        WebhooksApi { core: self }
    }

    pub fn events(&self) -> EventsApi<'_, S> {
        EventsApi { core: self }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &ForemanConfig {
        &self.config
    }

    fn agent_api(&self) -> Result<Arc<dyn AgentApi>, ForemanError> {
        self.agent_api
            .clone()
            .ok_or(ForemanError::Client(ClientError::Unavailable))
    }

    fn code_host(&self) -> Result<Arc<dyn CodeHost>, ForemanError> {
        self.code_host
            .clone()
            .ok_or(ForemanError::Client(ClientError::Unavailable))
    }

    fn with_events<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T, ForemanError>
    where
        F: FnOnce(&S) -> Result<(T, Vec<EventBody>), ForemanError>,
    {
        let (value, records) = self.store.with_tx(|store| {
            let (value, bodies) = f(store)?;
            let mut records = Vec::new();
            for body in bodies {
                let record = build_event_record(ctx, body)?;
                let record = store.events().append(record)?;
                records.push(record);
            }
            Ok((value, records))
        })?;
        for record in records {
            self.event_bus.publish(record);
        }
        Ok(value)
    }

    async fn launch_remote(
        &self,
        prompt: String,
        repo: &str,
        branch: Option<&str>,
        target_branch: Option<&str>,
        model: Option<&str>,
    ) -> Result<AgentSnapshot, ForemanError> {
        let api = self.agent_api()?;
        let request = LaunchRequest {
            prompt,
            repository: repo.to_string(),
            r#ref: branch.map(str::to_string),
            target_branch: target_branch.map(str::to_string),
            model: model.map(str::to_string),
        };
        let snapshot = self
            .retry
            .run("agent.launch", || api.launch(&request))
            .await?;
        Ok(snapshot)
    }

    /// Persists what the Agent API reported and routes completion signals to
    /// the owning workflow or review loop. Returns the record plus whether a
    /// write happened; unchanged snapshots are a no-op.
    async fn apply_snapshot(
        &self,
        ctx: &RequestContext,
        record: AgentRecord,
        snapshot: &AgentSnapshot,
    ) -> Result<(AgentRecord, bool), ForemanError> {
        let status = status_from_remote(snapshot.status);
        let changed = status != record.status
            || snapshot.pr_url != record.pr_url
            || snapshot.summary != record.summary;
        if !changed {
            return Ok((record, false));
        }
        let from = record.status;
        let mut next = record;
        next.status = status;
        next.pr_url = snapshot.pr_url.clone();
        next.summary = snapshot.summary.clone();
        next.updated_at = Utc::now();
        let next = self.with_events(ctx, |store| {
            store.agents().save(&next)?;
            let bodies = if status == from {
                Vec::new()
            } else {
                vec![EventBody::AgentStatusChanged {
                    agent: next.clone(),
                    from,
                    to: status,
                }]
            };
            Ok((next.clone(), bodies))
        })?;
        if status != from && status.is_terminal() {
            self.route_terminal(ctx, &next).await?;
        }
        Ok((next, true))
    }

    /// A terminal agent is a signal for whatever owns it.
    async fn route_terminal(
        &self,
        ctx: &RequestContext,
        agent: &AgentRecord,
    ) -> Result<(), ForemanError> {
        match (agent.status, agent.role) {
            (AgentStatus::Finished, AgentRole::Planner) => {
                if let Some(workflow_id) = &agent.workflow_id {
                    self.workflows()
                        .on_planner_finished(ctx, workflow_id, agent.summary.clone())
                        .await?;
                }
            }
            (AgentStatus::Finished, AgentRole::Implementer) => {
                if let Some(workflow_id) = &agent.workflow_id {
                    self.workflows()
                        .on_implementer_finished(ctx, workflow_id, agent)
                        .await?;
                }
            }
            (AgentStatus::Finished, AgentRole::Fix) => {
                if let Some(loop_id) = &agent.review_loop_id {
                    self.review_loops().on_fix_finished(ctx, loop_id).await?;
                }
            }
            (AgentStatus::Finished, AgentRole::Standalone) => {
                if agent.pr_url.is_some() {
                    self.review_loops().start(ctx, agent).await?;
                }
            }
            (AgentStatus::Failed | AgentStatus::Stopped, _) => {
                let reason = format!("agent {} is {:?}", agent.id, agent.status);
                if let Some(workflow_id) = &agent.workflow_id {
                    self.workflows().reject(ctx, workflow_id, &reason)?;
                }
                if let Some(loop_id) = &agent.review_loop_id {
                    self.review_loops().fail(ctx, loop_id, &reason)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

pub struct AgentsApi<'a, S: Store> {
    core: &'a Foreman<S>,
}

impl<'a, S: Store> AgentsApi<'a, S> {
    /// Launches work. With `hitl` set this creates a workflow parked at its
    /// first review gate instead of calling the Agent API directly.
    pub async fn launch(
        &self,
        ctx: &RequestContext,
        input: LaunchInput,
    ) -> Result<LaunchOutcome, ForemanError> {
        if input.prompt.trim().is_empty() {
            return Err(AgentError::InvalidInput {
                message: "prompt must not be empty".to_string(),
            }
            .into());
        }
        if input.repo.trim().is_empty() {
            return Err(AgentError::InvalidInput {
                message: "repo must not be empty".to_string(),
            }
            .into());
        }
        if input.hitl {
            return self.launch_workflow(ctx, input).await;
        }
        let snapshot = self
            .core
            .launch_remote(
                input.prompt.clone(),
                &input.repo,
                input.branch.as_deref(),
                input.target_branch.as_deref(),
                input.model.as_deref(),
            )
            .await?;
        let agent = agent_from_snapshot(
            &snapshot,
            AgentRole::Standalone,
            input.origin.clone(),
            input.repo.clone(),
            input.branch.clone(),
            input.target_branch.clone(),
            input.prompt.clone(),
            input.model.clone(),
            None,
        )?;
        let agent = self.core.with_events(ctx, |store| {
            store.agents().save(&agent)?;
            let body = EventBody::AgentLaunched {
                agent: agent.clone(),
            };
            Ok((agent.clone(), vec![body]))
        })?;
        Ok(LaunchOutcome::Agent(agent))
    }

    async fn launch_workflow(
        &self,
        ctx: &RequestContext,
        input: LaunchInput,
    ) -> Result<LaunchOutcome, ForemanError> {
        let now = Utc::now();
        let mut workflow = WorkflowRecord {
            id: WorkflowId::generate(),
            phase: WorkflowPhase::ContextReview,
            plan_iteration_count: 0,
            context: None,
            plan: None,
            planner_agent_id: None,
            implementer_agent_id: None,
            skip_context_review: input.skip_context_review,
            skip_plan_review: input.skip_plan_review,
            repo: input.repo,
            branch: input.branch,
            target_branch: input.target_branch,
            prompt: input.prompt,
            model: input.model,
            origin: input.origin,
            created_at: now,
            updated_at: now,
        };
        if !input.skip_context_review {
            let workflow = self.core.with_events(ctx, |store| {
                store.workflows().save(&workflow)?;
                let body = EventBody::WorkflowPhaseChanged {
                    workflow: workflow.clone(),
                    from: None,
                    to: WorkflowPhase::ContextReview,
                    launched_agent_id: None,
                };
                Ok((workflow.clone(), vec![body]))
            })?;
            return Ok(LaunchOutcome::Workflow(workflow));
        }
        // Context review skipped: the planner goes out immediately.
        let snapshot = self
            .core
            .launch_remote(
                planner_prompt(&workflow),
                &workflow.repo,
                workflow.branch.as_deref(),
                workflow.target_branch.as_deref(),
                workflow.model.as_deref(),
            )
            .await?;
        let agent = agent_from_snapshot(
            &snapshot,
            AgentRole::Planner,
            workflow.origin.clone(),
            workflow.repo.clone(),
            workflow.branch.clone(),
            workflow.target_branch.clone(),
            workflow.prompt.clone(),
            workflow.model.clone(),
            Some(workflow.id.clone()),
        )?;
        workflow.phase = WorkflowPhase::Planning;
        workflow.planner_agent_id = Some(agent.id.clone());
        workflow.updated_at = Utc::now();
        let workflow = self.core.with_events(ctx, |store| {
            store.workflows().save(&workflow)?;
            store.agents().save(&agent)?;
            let body = EventBody::WorkflowPhaseChanged {
                workflow: workflow.clone(),
                from: None,
                to: WorkflowPhase::Planning,
                launched_agent_id: Some(agent.id.clone()),
            };
            Ok((workflow.clone(), vec![body]))
        })?;
        Ok(LaunchOutcome::Workflow(workflow))
    }

    /// Fetches one agent, refreshing non-terminal records from the Agent API
    /// when a client is configured. A failed refresh returns the stored
    /// record rather than an error.
    pub async fn get(
        &self,
        ctx: &RequestContext,
        id: &AgentId,
    ) -> Result<AgentRecord, ForemanError> {
        let record = self
            .core
            .store
            .agents()
            .get(id)?
            .ok_or(AgentError::NotFound)?;
        if record.status.is_terminal() || self.core.agent_api.is_none() {
            return Ok(record);
        }
        let api = self.core.agent_api()?;
        match self
            .core
            .retry
            .run("agent.get", || api.get(id.as_str()))
            .await
        {
            Ok(snapshot) => {
                let (record, _) = self.core.apply_snapshot(ctx, record, &snapshot).await?;
                Ok(record)
            }
            Err(err) => {
                warn!(agent = %id, error = %err, "refresh failed, serving stored record");
                Ok(record)
            }
        }
    }

    pub fn list(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, ForemanError> {
        Ok(self.core.store.agents().list(filter)?)
    }

    /// Relays a user message to a running agent. Anything not Running is an
    /// illegal-state rejection before any API call is attempted.
    pub async fn follow_up(
        &self,
        _ctx: &RequestContext,
        id: &AgentId,
        input: FollowUpInput,
    ) -> Result<(), ForemanError> {
        if input.message.trim().is_empty() {
            return Err(AgentError::InvalidInput {
                message: "message must not be empty".to_string(),
            }
            .into());
        }
        let record = self
            .core
            .store
            .agents()
            .get(id)?
            .ok_or(AgentError::NotFound)?;
        if record.status != AgentStatus::Running {
            return Err(AgentError::IllegalState {
                status: record.status,
            }
            .into());
        }
        let api = self.core.agent_api()?;
        self.core
            .retry
            .run("agent.follow_up", || {
                api.follow_up(id.as_str(), &input.message)
            })
            .await?;
        Ok(())
    }

    /// Stops a running agent. One-way: the record goes terminal, leaves the
    /// active index, and any owning workflow or loop is closed out.
    pub async fn cancel(
        &self,
        ctx: &RequestContext,
        id: &AgentId,
    ) -> Result<AgentRecord, ForemanError> {
        let record = self
            .core
            .store
            .agents()
            .get(id)?
            .ok_or(AgentError::NotFound)?;
        if record.status.is_terminal() {
            return Err(AgentError::IllegalState {
                status: record.status,
            }
            .into());
        }
        let api = self.core.agent_api()?;
        self.core
            .retry
            .run("agent.stop", || api.stop(id.as_str()))
            .await?;
        let mut next = record;
        next.status = AgentStatus::Stopped;
        next.updated_at = Utc::now();
        let next = self.core.with_events(ctx, |store| {
            store.agents().save(&next)?;
            let body = EventBody::AgentStopped {
                agent_id: next.id.clone(),
            };
            Ok((next.clone(), vec![body]))
        })?;
        self.core.route_terminal(ctx, &next).await?;
        Ok(next)
    }

    pub fn archive(
        &self,
        ctx: &RequestContext,
        id: &AgentId,
        archived: bool,
    ) -> Result<AgentRecord, ForemanError> {
        self.core.with_events(ctx, |store| {
            let record = store.agents().get(id)?.ok_or(AgentError::NotFound)?;
            if record.archived == archived {
                return Ok((record, Vec::new()));
            }
            let mut next = record;
            next.archived = archived;
            next.updated_at = Utc::now();
            store.agents().save(&next)?;
            Ok((next, Vec::new()))
        })
    }

    /// Deletes a terminal agent record. Running agents must be cancelled
    /// first so no remote agent is orphaned.
    pub fn delete(&self, ctx: &RequestContext, id: &AgentId) -> Result<(), ForemanError> {
        self.core.with_events(ctx, |store| {
            let record = store.agents().get(id)?.ok_or(AgentError::NotFound)?;
            if !record.status.is_terminal() {
                return Err(AgentError::IllegalState {
                    status: record.status,
                }
                .into());
            }
            store.agents().delete(id)?;
            let body = EventBody::AgentDeleted {
                agent_id: record.id,
            };
            Ok(((), vec![body]))
        })
    }

    /// One reconciliation sweep over the active index. Per-record failures
    /// are logged and counted; the sweep itself never aborts.
    pub async fn reconcile(&self, ctx: &RequestContext) -> Result<SweepStats, ForemanError> {
        let Ok(api) = self.core.agent_api() else {
            return Ok(SweepStats::default());
        };
        let active = self.core.store.agents().list_active()?;
        let mut stats = SweepStats::default();
        for record in active {
            stats.checked += 1;
            let snapshot = match self
                .core
                .retry
                .run("agent.get", || api.get(record.id.as_str()))
                .await
            {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(agent = %record.id, error = %err, "reconcile query failed, skipping");
                    stats.failed += 1;
                    continue;
                }
            };
            let agent_id = record.id.clone();
            match self.core.apply_snapshot(ctx, record, &snapshot).await {
                Ok((_, true)) => stats.updated += 1,
                Ok((_, false)) => {}
                Err(err) => {
                    warn!(agent = %agent_id, error = %err, "reconcile dispatch failed, skipping");
                    stats.failed += 1;
                }
            }
        }
        // Expired dedup markers ride along with the sweep.
        if let Err(err) = self.core.store.deliveries().cleanup(Utc::now()) {
            warn!(error = %err, "delivery cleanup failed");
        }
        Ok(stats)
    }
}

pub struct WorkflowsApi<'a, S: Store> {
    core: &'a Foreman<S>,
}

impl<'a, S: Store> WorkflowsApi<'a, S> {
    pub fn get(&self, id: &WorkflowId) -> Result<WorkflowRecord, ForemanError> {
        self.core
            .store
            .workflows()
            .get(id)?
            .ok_or(WorkflowError::NotFound.into())
    }

    /// Applies an accept/reject button press. A press whose expected phase
    /// no longer matches the stored phase is a stale no-op, not an error, so
    /// duplicate and late callbacks are harmless.
    pub async fn handle_action(
        &self,
        ctx: &RequestContext,
        id: &WorkflowId,
        input: WorkflowActionInput,
    ) -> Result<WorkflowActionOutcome, ForemanError> {
        let workflow = self.get(id)?;
        if workflow.phase != input.expected_phase {
            return Ok(WorkflowActionOutcome {
                workflow,
                stale: true,
            });
        }
        let workflow = match (workflow.phase, input.action) {
            (WorkflowPhase::ContextReview, WorkflowAction::Accept) => {
                self.start_planning(ctx, workflow, input.feedback).await?
            }
            (WorkflowPhase::PlanReview, WorkflowAction::Accept) => {
                self.start_implementing(ctx, workflow).await?
            }
            (WorkflowPhase::PlanReview, WorkflowAction::Reject) => match input.feedback {
                Some(feedback) if !feedback.trim().is_empty() => {
                    self.request_replan(ctx, workflow, feedback).await?
                }
                _ => self.reject(ctx, id, "plan rejected")?,
            },
            (WorkflowPhase::ContextReview, WorkflowAction::Reject) => {
                self.reject(ctx, id, "context rejected")?
            }
            (phase, action) => {
                return Err(WorkflowError::InvalidInput {
                    message: format!("no {action:?} action in phase {phase:?}"),
                }
                .into());
            }
        };
        Ok(WorkflowActionOutcome {
            workflow,
            stale: false,
        })
    }

    async fn start_planning(
        &self,
        ctx: &RequestContext,
        mut workflow: WorkflowRecord,
        context: Option<String>,
    ) -> Result<WorkflowRecord, ForemanError> {
        if let Some(context) = context {
            if !context.trim().is_empty() {
                workflow.context = Some(context);
            }
        }
        let snapshot = self
            .core
            .launch_remote(
                planner_prompt(&workflow),
                &workflow.repo,
                workflow.branch.as_deref(),
                workflow.target_branch.as_deref(),
                workflow.model.as_deref(),
            )
            .await?;
        let agent = agent_from_snapshot(
            &snapshot,
            AgentRole::Planner,
            workflow.origin.clone(),
            workflow.repo.clone(),
            workflow.branch.clone(),
            workflow.target_branch.clone(),
            workflow.prompt.clone(),
            workflow.model.clone(),
            Some(workflow.id.clone()),
        )?;
        let from = workflow.phase;
        workflow.phase = WorkflowPhase::Planning;
        workflow.planner_agent_id = Some(agent.id.clone());
        workflow.updated_at = Utc::now();
        self.persist_phase(ctx, from, &workflow, Some(agent.id.clone()), Some(&agent))
    }

    async fn start_implementing(
        &self,
        ctx: &RequestContext,
        mut workflow: WorkflowRecord,
    ) -> Result<WorkflowRecord, ForemanError> {
        let snapshot = self
            .core
            .launch_remote(
                implementer_prompt(&workflow),
                &workflow.repo,
                workflow.branch.as_deref(),
                workflow.target_branch.as_deref(),
                workflow.model.as_deref(),
            )
            .await?;
        let agent = agent_from_snapshot(
            &snapshot,
            AgentRole::Implementer,
            workflow.origin.clone(),
            workflow.repo.clone(),
            workflow.branch.clone(),
            workflow.target_branch.clone(),
            workflow.prompt.clone(),
            workflow.model.clone(),
            Some(workflow.id.clone()),
        )?;
        let from = workflow.phase;
        workflow.phase = WorkflowPhase::Implementing;
        workflow.implementer_agent_id = Some(agent.id.clone());
        workflow.updated_at = Utc::now();
        self.persist_phase(ctx, from, &workflow, Some(agent.id.clone()), Some(&agent))
    }

    /// Reject-with-feedback from plan review: the planner gets the feedback
    /// as a follow-up and the workflow re-enters Planning.
    async fn request_replan(
        &self,
        ctx: &RequestContext,
        mut workflow: WorkflowRecord,
        feedback: String,
    ) -> Result<WorkflowRecord, ForemanError> {
        let planner_id = workflow
            .planner_agent_id
            .clone()
            .ok_or(WorkflowError::InvalidInput {
                message: "workflow has no planner agent".to_string(),
            })?;
        let planner = self
            .core
            .store
            .agents()
            .get(&planner_id)?
            .ok_or(AgentError::NotFound)?;
        let api = self.core.agent_api()?;
        let message = format!("The plan was rejected with this feedback:\n\n{feedback}\n\nRevise the plan accordingly.");
        self.core
            .retry
            .run("agent.follow_up", || {
                api.follow_up(planner_id.as_str(), &message)
            })
            .await?;
        let from = workflow.phase;
        if !workflow_can_advance(from, WorkflowPhase::Planning) {
            return Err(WorkflowError::InvalidTransition {
                from,
                to: WorkflowPhase::Planning,
            }
            .into());
        }
        let now = Utc::now();
        workflow.phase = WorkflowPhase::Planning;
        workflow.plan_iteration_count += 1;
        workflow.plan = None;
        workflow.updated_at = now;
        let mut planner = planner;
        planner.status = AgentStatus::Running;
        planner.updated_at = now;
        self.core.with_events(ctx, |store| {
            store.workflows().save(&workflow)?;
            store.agents().save(&planner)?;
            let body = EventBody::PlanRevisionRequested {
                workflow: workflow.clone(),
                iteration: workflow.plan_iteration_count,
            };
            Ok((workflow.clone(), vec![body]))
        })
    }

    /// Poller signal: the planner's summary is the plan. Advances to plan
    /// review, or straight to implementation when that gate is skipped.
    pub async fn on_planner_finished(
        &self,
        ctx: &RequestContext,
        id: &WorkflowId,
        plan: Option<String>,
    ) -> Result<WorkflowRecord, ForemanError> {
        let mut workflow = self.get(id)?;
        if workflow.phase != WorkflowPhase::Planning {
            return Ok(workflow);
        }
        workflow.plan = plan;
        if workflow.skip_plan_review {
            return self.start_implementing(ctx, workflow).await;
        }
        let from = workflow.phase;
        workflow.phase = WorkflowPhase::PlanReview;
        workflow.updated_at = Utc::now();
        self.persist_phase(ctx, from, &workflow, None, None)
    }

    /// Poller signal: implementation is done. Completes the workflow and
    /// hands the PR to the review loop.
    pub async fn on_implementer_finished(
        &self,
        ctx: &RequestContext,
        id: &WorkflowId,
        agent: &AgentRecord,
    ) -> Result<WorkflowRecord, ForemanError> {
        let mut workflow = self.get(id)?;
        if workflow.phase != WorkflowPhase::Implementing {
            return Ok(workflow);
        }
        let from = workflow.phase;
        workflow.phase = WorkflowPhase::Complete;
        workflow.updated_at = Utc::now();
        let workflow = self.persist_phase(ctx, from, &workflow, None, None)?;
        if agent.pr_url.is_some() {
            self.core.review_loops().start(ctx, agent).await?;
        }
        Ok(workflow)
    }

    /// Terminates a workflow. No-op when already terminal so late failure
    /// signals are harmless.
    pub fn reject(
        &self,
        ctx: &RequestContext,
        id: &WorkflowId,
        _reason: &str,
    ) -> Result<WorkflowRecord, ForemanError> {
        let mut workflow = self.get(id)?;
        if workflow.phase.is_terminal() {
            return Ok(workflow);
        }
        let from = workflow.phase;
        workflow.phase = WorkflowPhase::Rejected;
        workflow.updated_at = Utc::now();
        self.persist_phase(ctx, from, &workflow, None, None)
    }

    fn persist_phase(
        &self,
        ctx: &RequestContext,
        from: WorkflowPhase,
        workflow: &WorkflowRecord,
        launched_agent_id: Option<AgentId>,
        agent: Option<&AgentRecord>,
    ) -> Result<WorkflowRecord, ForemanError> {
        if !workflow_can_advance(from, workflow.phase) {
            return Err(WorkflowError::InvalidTransition {
                from,
                to: workflow.phase,
            }
            .into());
        }
        self.core.with_events(ctx, |store| {
            store.workflows().save(workflow)?;
            if let Some(agent) = agent {
                store.agents().save(agent)?;
            }
            let body = EventBody::WorkflowPhaseChanged {
                workflow: workflow.clone(),
                from: Some(from),
                to: workflow.phase,
                launched_agent_id,
            };
            Ok((workflow.clone(), vec![body]))
        })
    }
}

pub struct ReviewLoopsApi<'a, S: Store> {
    core: &'a Foreman<S>,
}

impl<'a, S: Store> ReviewLoopsApi<'a, S> {
    pub fn get(&self, id: &ReviewLoopId) -> Result<ReviewLoopRecord, ForemanError> {
        self.core
            .store
            .review_loops()
            .get(id)?
            .ok_or(ReviewLoopError::NotFound.into())
    }

    pub fn history(
        &self,
        id: &ReviewLoopId,
    ) -> Result<Vec<ReviewLoopHistoryEntry>, ForemanError> {
        self.get(id)?;
        Ok(self.core.store.review_loops().history(id)?)
    }

    /// Opens a review loop for a finished agent's PR: marks it ready for
    /// review and requests the configured reviewer. Idempotent per PR URL.
    pub async fn start(
        &self,
        ctx: &RequestContext,
        agent: &AgentRecord,
    ) -> Result<ReviewLoopRecord, ForemanError> {
        let pr_url = agent
            .pr_url
            .clone()
            .ok_or(ReviewLoopError::MissingPrUrl)?;
        if let Some(existing) = self
            .core
            .store
            .review_loops()
            .find_by_pr_url(&normalize_pr_url(&pr_url))?
        {
            return Ok(existing);
        }
        let now = Utc::now();
        let record = ReviewLoopRecord {
            id: ReviewLoopId::generate(),
            agent_id: agent.id.clone(),
            pr_url,
            branch: agent.branch.clone(),
            phase: ReviewLoopPhase::RequestingReview,
            iteration: 0,
            created_at: now,
            updated_at: now,
        };
        let mut linked = agent.clone();
        linked.review_loop_id = Some(record.id.clone());
        linked.updated_at = now;
        let record = self.core.with_events(ctx, |store| {
            store.review_loops().save(&record)?;
            store.review_loops().append_history(&ReviewLoopHistoryEntry {
                loop_id: record.id.clone(),
                phase: ReviewLoopPhase::RequestingReview,
                detail: "review requested".to_string(),
                at: now,
            })?;
            store.agents().save(&linked)?;
            let body = EventBody::ReviewLoopPhaseChanged {
                review_loop: record.clone(),
                from: None,
                to: ReviewLoopPhase::RequestingReview,
                detail: "review requested".to_string(),
            };
            Ok((record.clone(), vec![body]))
        })?;
        let Ok(host) = self.core.code_host() else {
            return self.fail(ctx, &record.id, "code host not configured");
        };
        match self.request_review(&host, &record).await {
            Ok(()) => {
                let mut next = record.clone();
                next.phase = ReviewLoopPhase::AwaitingReview;
                next.updated_at = Utc::now();
                self.persist_transition(ctx, record.phase, next, "awaiting review", None)
            }
            Err(err) => self.fail(ctx, &record.id, &err.to_string()),
        }
    }

    async fn request_review(
        &self,
        host: &Arc<dyn CodeHost>,
        record: &ReviewLoopRecord,
    ) -> Result<(), ForemanError> {
        let pr = PrRef::parse(&record.pr_url)?;
        self.core
            .retry
            .run("code_host.mark_ready_for_review", || {
                host.mark_ready_for_review(&pr)
            })
            .await?;
        let reviewer = self.core.config.reviewer.clone();
        self.core
            .retry
            .run("code_host.request_reviewer", || {
                host.request_reviewer(&pr, &reviewer)
            })
            .await?;
        Ok(())
    }

    /// Changes-requested review verdict. At the iteration cap the loop parks
    /// in MaxIterations; below it the owning agent gets the feedback as a
    /// follow-up and the loop enters Fixing.
    pub async fn on_changes_requested(
        &self,
        ctx: &RequestContext,
        id: &ReviewLoopId,
        reviewer: &str,
        feedback: &str,
    ) -> Result<ReviewLoopRecord, ForemanError> {
        let record = self.get(id)?;
        if record.phase != ReviewLoopPhase::AwaitingReview {
            return Ok(record);
        }
        if record.iteration >= self.core.config.max_review_iterations {
            let mut next = record.clone();
            next.phase = ReviewLoopPhase::MaxIterations;
            next.updated_at = Utc::now();
            return self.persist_transition(
                ctx,
                record.phase,
                next,
                "iteration limit reached",
                None,
            );
        }
        let agent = self
            .core
            .store
            .agents()
            .get(&record.agent_id)?
            .ok_or(AgentError::NotFound)?;
        let api = self.core.agent_api()?;
        let message = format!(
            "Reviewer {reviewer} requested changes on {}:\n\n{feedback}\n\nAddress the review feedback and push the fixes.",
            record.pr_url
        );
        if let Err(err) = self
            .core
            .retry
            .run("agent.follow_up", || {
                api.follow_up(record.agent_id.as_str(), &message)
            })
            .await
        {
            return self.fail(ctx, id, &err.to_string());
        }
        let now = Utc::now();
        let mut next = record.clone();
        next.phase = ReviewLoopPhase::Fixing;
        next.iteration += 1;
        next.updated_at = now;
        let mut fixer = agent;
        fixer.status = AgentStatus::Running;
        fixer.role = AgentRole::Fix;
        fixer.updated_at = now;
        let detail = format!("changes requested by {reviewer}, fix cycle {}", next.iteration);
        self.persist_transition(ctx, record.phase, next, &detail, Some(&fixer))
    }

    /// Fix agent finished. At the cap this parks in MaxIterations without
    /// asking the reviewer again; otherwise the review is re-requested.
    pub async fn on_fix_finished(
        &self,
        ctx: &RequestContext,
        id: &ReviewLoopId,
    ) -> Result<ReviewLoopRecord, ForemanError> {
        let record = self.get(id)?;
        if record.phase != ReviewLoopPhase::Fixing {
            return Ok(record);
        }
        if record.iteration >= self.core.config.max_review_iterations {
            let mut next = record.clone();
            next.phase = ReviewLoopPhase::MaxIterations;
            next.updated_at = Utc::now();
            return self.persist_transition(
                ctx,
                record.phase,
                next,
                "iteration limit reached",
                None,
            );
        }
        let Ok(host) = self.core.code_host() else {
            return self.fail(ctx, id, "code host not configured");
        };
        let pr = PrRef::parse(&record.pr_url)?;
        let reviewer = self.core.config.reviewer.clone();
        if let Err(err) = self
            .core
            .retry
            .run("code_host.request_reviewer", || {
                host.request_reviewer(&pr, &reviewer)
            })
            .await
        {
            return self.fail(ctx, id, &err.to_string());
        }
        let mut next = record.clone();
        next.phase = ReviewLoopPhase::AwaitingReview;
        next.updated_at = Utc::now();
        let detail = format!("fixes pushed, review re-requested (cycle {})", record.iteration);
        self.persist_transition(ctx, record.phase, next, &detail, None)
    }

    pub fn on_approved(
        &self,
        ctx: &RequestContext,
        id: &ReviewLoopId,
        reviewer: &str,
    ) -> Result<ReviewLoopRecord, ForemanError> {
        let record = self.get(id)?;
        if record.phase != ReviewLoopPhase::AwaitingReview {
            return Ok(record);
        }
        let mut next = record.clone();
        next.phase = ReviewLoopPhase::Approved;
        next.updated_at = Utc::now();
        let detail = format!("approved by {reviewer}");
        self.persist_transition(ctx, record.phase, next, &detail, None)
    }

    /// A comment-only review verdict means the reviewer could not decide;
    /// the loop escalates to a human.
    pub fn on_comment_only(
        &self,
        ctx: &RequestContext,
        id: &ReviewLoopId,
        reviewer: &str,
    ) -> Result<ReviewLoopRecord, ForemanError> {
        let record = self.get(id)?;
        if record.phase != ReviewLoopPhase::AwaitingReview {
            return Ok(record);
        }
        let mut next = record.clone();
        next.phase = ReviewLoopPhase::HumanReview;
        next.updated_at = Utc::now();
        let detail = format!("comment-only review by {reviewer}, escalating to a human");
        self.persist_transition(ctx, record.phase, next, &detail, None)
    }

    /// Records a plain PR comment on the loop history. Comments carry no
    /// verdict, so the phase stays put and no event is emitted.
    pub fn on_pr_comment(
        &self,
        id: &ReviewLoopId,
        author: &str,
    ) -> Result<ReviewLoopRecord, ForemanError> {
        let record = self.get(id)?;
        if record.phase.is_final() {
            return Ok(record);
        }
        self.core.store.review_loops().append_history(&ReviewLoopHistoryEntry {
            loop_id: record.id.clone(),
            phase: record.phase,
            detail: format!("comment by {author}"),
            at: Utc::now(),
        })?;
        Ok(record)
    }

    pub fn on_pr_closed(
        &self,
        ctx: &RequestContext,
        id: &ReviewLoopId,
        merged: bool,
    ) -> Result<ReviewLoopRecord, ForemanError> {
        let record = self.get(id)?;
        if record.phase.is_final() {
            return Ok(record);
        }
        if !merged {
            return self.fail(ctx, id, "pull request closed without merge");
        }
        if !loop_can_advance(record.phase, ReviewLoopPhase::Complete) {
            return Ok(record);
        }
        let mut next = record.clone();
        next.phase = ReviewLoopPhase::Complete;
        next.updated_at = Utc::now();
        self.persist_transition(ctx, record.phase, next, "pull request merged", None)
    }

    /// Terminates a loop on unrecoverable failure. No-op when already final.
    pub fn fail(
        &self,
        ctx: &RequestContext,
        id: &ReviewLoopId,
        reason: &str,
    ) -> Result<ReviewLoopRecord, ForemanError> {
        let record = self.get(id)?;
        if record.phase.is_final() {
            return Ok(record);
        }
        let mut next = record.clone();
        next.phase = ReviewLoopPhase::Failed;
        next.updated_at = Utc::now();
        self.persist_transition(ctx, record.phase, next, reason, None)
    }

    /// Saves one transition, its history entry, and the one notification it
    /// produces, atomically.
    fn persist_transition(
        &self,
        ctx: &RequestContext,
        from: ReviewLoopPhase,
        next: ReviewLoopRecord,
        detail: &str,
        agent: Option<&AgentRecord>,
    ) -> Result<ReviewLoopRecord, ForemanError> {
        if !loop_can_advance(from, next.phase) {
            return Err(ReviewLoopError::InvalidTransition {
                from,
                to: next.phase,
            }
            .into());
        }
        let entry = ReviewLoopHistoryEntry {
            loop_id: next.id.clone(),
            phase: next.phase,
            detail: detail.to_string(),
            at: next.updated_at,
        };
        let body = match next.phase {
            ReviewLoopPhase::MaxIterations => EventBody::ReviewLoopExhausted {
                review_loop_id: next.id.clone(),
                iterations: next.iteration,
            },
            ReviewLoopPhase::Failed => EventBody::ReviewLoopFailed {
                review_loop_id: next.id.clone(),
                reason: detail.to_string(),
            },
            _ => EventBody::ReviewLoopPhaseChanged {
                review_loop: next.clone(),
                from: Some(from),
                to: next.phase,
                detail: detail.to_string(),
            },
        };
        self.core.with_events(ctx, |store| {
            store.review_loops().save(&next)?;
            store.review_loops().append_history(&entry)?;
            if let Some(agent) = agent {
                store.agents().save(agent)?;
            }
            Ok((next.clone(), vec![body]))
        })
    }
}

pub struct WebhooksApi<'a, S: Store> {
    core: &'a Foreman<S>,
}

impl<'a, S: Store> WebhooksApi<'a, S> {
    /// Ingests one verified code-host delivery. Returns false when the
    /// delivery was a duplicate or concerned an untracked PR; both are
    /// silent discards.
    pub async fn ingest(
        &self,
        ctx: &RequestContext,
        event: WebhookEvent,
    ) -> Result<bool, ForemanError> {
        if event.delivery_id.trim().is_empty() {
            return Err(EventError::InvalidInput {
                message: "delivery id must not be empty".to_string(),
            }
            .into());
        }
        let now = Utc::now();
        let retention = self.core.config.delivery_retention_secs;
        let fresh = self.core.store.with_tx(|store| {
            if store.deliveries().is_processed(&event.delivery_id)? {
                return Ok(false);
            }
            store
                .deliveries()
                .mark_processed(&event.delivery_id, now, retention)?;
            Ok(true)
        })?;
        if !fresh {
            return Ok(false);
        }
        let Some(record) = self.resolve(&event)? else {
            return Ok(false);
        };
        match event.payload {
            WebhookPayload::ReviewSubmitted {
                reviewer,
                verdict,
                body,
            } => match verdict {
                ReviewVerdict::ChangesRequested => {
                    self.core
                        .review_loops()
                        .on_changes_requested(
                            ctx,
                            &record.id,
                            &reviewer,
                            body.as_deref().unwrap_or_default(),
                        )
                        .await?;
                }
                ReviewVerdict::Approved => {
                    self.core
                        .review_loops()
                        .on_approved(ctx, &record.id, &reviewer)?;
                }
                ReviewVerdict::Commented => {
                    self.core
                        .review_loops()
                        .on_comment_only(ctx, &record.id, &reviewer)?;
                }
            },
            WebhookPayload::CommentCreated { author, .. } => {
                self.core.review_loops().on_pr_comment(&record.id, &author)?;
            }
            WebhookPayload::PrClosed { merged } => {
                self.core
                    .review_loops()
                    .on_pr_closed(ctx, &record.id, merged)?;
            }
        }
        Ok(true)
    }

    fn resolve(&self, event: &WebhookEvent) -> Result<Option<ReviewLoopRecord>, ForemanError> {
        let loops = self.core.store.review_loops();
        if let Some(pr_url) = &event.pr_url {
            if let Some(record) = loops.find_by_pr_url(&normalize_pr_url(pr_url))? {
                return Ok(Some(record));
            }
        }
        if let Some(branch) = &event.branch {
            if let Some(record) = loops.find_by_branch(&normalize_branch(branch))? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

pub struct EventsApi<'a, S: Store> {
    core: &'a Foreman<S>,
}

impl<'a, S: Store> EventsApi<'a, S> {
    pub fn list(
        &self,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<EventRecord>, ForemanError> {
        Ok(self.core.store.events().list(after, limit)?)
    }
}

fn build_event_record(ctx: &RequestContext, body: EventBody) -> Result<EventRecord, ForemanError> {
    let value = serde_json::to_value(body).map_err(|err| ForemanError::Internal {
        message: err.to_string(),
    })?;
    Ok(EventRecord {
        id: String::new(),
        seq: 0,
        at: Utc::now(),
        correlation_id: ctx.correlation_id.clone(),
        source: ctx.source,
        body: value,
    })
}

fn status_from_remote(status: RemoteStatus) -> AgentStatus {
    match status {
        RemoteStatus::Creating => AgentStatus::Creating,
        RemoteStatus::Running => AgentStatus::Running,
        RemoteStatus::Finished => AgentStatus::Finished,
        RemoteStatus::Failed => AgentStatus::Failed,
        RemoteStatus::Stopped => AgentStatus::Stopped,
    }
}

#[allow(clippy::too_many_arguments)]
fn agent_from_snapshot(
    snapshot: &AgentSnapshot,
    role: AgentRole,
    origin: Origin,
    repo: String,
    branch: Option<String>,
    target_branch: Option<String>,
    prompt: String,
    model: Option<String>,
    workflow_id: Option<WorkflowId>,
) -> Result<AgentRecord, ForemanError> {
    let id = AgentId::new(snapshot.id.clone()).map_err(|err| AgentError::InvalidInput {
        message: err.to_string(),
    })?;
    let now = Utc::now();
    Ok(AgentRecord {
        id,
        origin,
        status: status_from_remote(snapshot.status),
        role,
        repo,
        branch,
        target_branch,
        prompt,
        model,
        pr_url: snapshot.pr_url.clone(),
        summary: snapshot.summary.clone(),
        workflow_id,
        review_loop_id: None,
        archived: false,
        created_at: now,
        updated_at: now,
    })
}

fn planner_prompt(workflow: &WorkflowRecord) -> String {
    let mut prompt = format!(
        "Produce an implementation plan for the following task. Do not write code yet.\n\nTask:\n{}",
        workflow.prompt
    );
    if let Some(context) = &workflow.context {
        prompt.push_str("\n\nAdditional context:\n");
        prompt.push_str(context);
    }
    prompt
}

fn implementer_prompt(workflow: &WorkflowRecord) -> String {
    let mut prompt = format!(
        "Implement the following task and open a pull request.\n\nTask:\n{}",
        workflow.prompt
    );
    if let Some(plan) = &workflow.plan {
        prompt.push_str("\n\nFollow this approved plan:\n");
        prompt.push_str(plan);
    }
    prompt
}
