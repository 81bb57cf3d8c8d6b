use crate::util::{decode_enum, encode_enum, from_rfc3339, to_rfc3339};
use fm_core::error::WorkflowError;
use fm_core::types::agent::Origin;
use fm_core::types::ids::{AgentId, WorkflowId};
use fm_core::types::workflow::WorkflowRecord;
use fm_core::workflows::WorkflowRepository;
use rusqlite::Connection;
use std::sync::MutexGuard;
use std::str::FromStr;

const WORKFLOW_COLUMNS: &str = "id, phase, plan_iteration_count, context, plan, planner_agent_id, implementer_agent_id, skip_context_review, skip_plan_review, repo, branch, target_branch, prompt, model, channel_id, post_id, user_id, created_at, updated_at";

pub struct WorkflowRepo<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> WorkflowRepo<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }
}

fn storage(err: impl std::fmt::Display) -> WorkflowError {
    WorkflowError::Storage {
        message: err.to_string(),
    }
}

impl<'a> WorkflowRepository for WorkflowRepo<'a> {
    fn get(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>, WorkflowError> {
        let sql = format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql).map_err(storage)?;
        let mut rows = stmt.query([id.as_str()]).map_err(storage)?;
        let Some(row) = rows.next().map_err(storage)? else {
            return Ok(None);
        };
        map_workflow_row(row).map(Some)
    }

    fn save(&self, record: &WorkflowRecord) -> Result<(), WorkflowError> {
        let sql = format!(
            "INSERT OR REPLACE INTO workflows ({WORKFLOW_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
        );
        let params = rusqlite::params![
            record.id.as_str(),
            encode_enum(&record.phase).map_err(storage)?,
            record.plan_iteration_count,
            record.context,
            record.plan,
            record.planner_agent_id.as_ref().map(AgentId::as_str),
            record.implementer_agent_id.as_ref().map(AgentId::as_str),
            record.skip_context_review,
            record.skip_plan_review,
            record.repo,
            record.branch,
            record.target_branch,
            record.prompt,
            record.model,
            record.origin.channel_id,
            record.origin.post_id,
            record.origin.user_id,
            to_rfc3339(&record.created_at),
            to_rfc3339(&record.updated_at),
        ];
        self.conn.execute(&sql, params).map_err(storage)?;
        Ok(())
    }

    fn delete(&self, id: &WorkflowId) -> Result<bool, WorkflowError> {
        let affected = self
            .conn
            .execute("DELETE FROM workflows WHERE id = ?1", [id.as_str()])
            .map_err(storage)?;
        Ok(affected > 0)
    }
}

fn map_workflow_row(row: &rusqlite::Row<'_>) -> Result<WorkflowRecord, WorkflowError> {
    let id: String = row.get(0).map_err(storage)?;
    let phase: String = row.get(1).map_err(storage)?;
    let plan_iteration_count: u32 = row.get(2).map_err(storage)?;
    let context: Option<String> = row.get(3).map_err(storage)?;
    let plan: Option<String> = row.get(4).map_err(storage)?;
    let planner_agent_id: Option<String> = row.get(5).map_err(storage)?;
    let implementer_agent_id: Option<String> = row.get(6).map_err(storage)?;
    let skip_context_review: bool = row.get(7).map_err(storage)?;
    let skip_plan_review: bool = row.get(8).map_err(storage)?;
    let repo: String = row.get(9).map_err(storage)?;
    let branch: Option<String> = row.get(10).map_err(storage)?;
    let target_branch: Option<String> = row.get(11).map_err(storage)?;
    let prompt: String = row.get(12).map_err(storage)?;
    let model: Option<String> = row.get(13).map_err(storage)?;
    let channel_id: String = row.get(14).map_err(storage)?;
    let post_id: String = row.get(15).map_err(storage)?;
    let user_id: String = row.get(16).map_err(storage)?;
    let created_at: String = row.get(17).map_err(storage)?;
    let updated_at: String = row.get(18).map_err(storage)?;

    Ok(WorkflowRecord {
        id: WorkflowId::from_str(&id).map_err(storage)?,
        phase: decode_enum(&phase).map_err(storage)?,
        plan_iteration_count,
        context,
        plan,
        planner_agent_id: planner_agent_id
            .map(|value| AgentId::from_str(&value))
            .transpose()
            .map_err(storage)?,
        implementer_agent_id: implementer_agent_id
            .map(|value| AgentId::from_str(&value))
            .transpose()
            .map_err(storage)?,
        skip_context_review,
        skip_plan_review,
        repo,
        branch,
        target_branch,
        prompt,
        model,
        origin: Origin {
            channel_id,
            post_id,
            user_id,
        },
        created_at: from_rfc3339(&created_at).map_err(storage)?,
        updated_at: from_rfc3339(&updated_at).map_err(storage)?,
    })
}
