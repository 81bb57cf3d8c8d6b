use crate::util::{decode_enum, encode_enum, from_rfc3339, to_rfc3339};
use fm_core::agents::AgentRepository;
use fm_core::error::AgentError;
use fm_core::types::agent::{AgentRecord, Origin};
use fm_core::types::ids::{AgentId, ReviewLoopId, WorkflowId};
use fm_core::types::io::AgentFilter;
use rusqlite::Connection;
use std::sync::MutexGuard;
use std::str::FromStr;

const AGENT_COLUMNS: &str = "id, channel_id, post_id, user_id, status, role, repo, branch, target_branch, prompt, model, pr_url, summary, workflow_id, review_loop_id, archived, created_at, updated_at";

pub struct AgentRepo<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> AgentRepo<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }
}

fn storage(err: impl std::fmt::Display) -> AgentError {
    AgentError::Storage {
        message: err.to_string(),
    }
}

impl<'a> AgentRepository for AgentRepo<'a> {
    fn get(&self, id: &AgentId) -> Result<Option<AgentRecord>, AgentError> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql).map_err(storage)?;
        let mut rows = stmt.query([id.as_str()]).map_err(storage)?;
        let Some(row) = rows.next().map_err(storage)? else {
            return Ok(None);
        };
        map_agent_row(row).map(Some)
    }

    fn save(&self, record: &AgentRecord) -> Result<(), AgentError> {
        let sql = format!(
            "INSERT OR REPLACE INTO agents ({AGENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        );
        let params = rusqlite::params![
            record.id.as_str(),
            record.origin.channel_id,
            record.origin.post_id,
            record.origin.user_id,
            encode_enum(&record.status).map_err(storage)?,
            encode_enum(&record.role).map_err(storage)?,
            record.repo,
            record.branch,
            record.target_branch,
            record.prompt,
            record.model,
            record.pr_url,
            record.summary,
            record.workflow_id.as_ref().map(WorkflowId::as_str),
            record.review_loop_id.as_ref().map(ReviewLoopId::as_str),
            record.archived,
            to_rfc3339(&record.created_at),
            to_rfc3339(&record.updated_at),
        ];
        self.conn.execute(&sql, params).map_err(storage)?;
        if record.status.is_terminal() {
            self.conn
                .execute(
                    "DELETE FROM agent_active WHERE agent_id = ?1",
                    [record.id.as_str()],
                )
                .map_err(storage)?;
        } else {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO agent_active (agent_id) VALUES (?1)",
                    [record.id.as_str()],
                )
                .map_err(storage)?;
        }
        Ok(())
    }

    fn delete(&self, id: &AgentId) -> Result<bool, AgentError> {
        self.conn
            .execute("DELETE FROM agent_active WHERE agent_id = ?1", [id.as_str()])
            .map_err(storage)?;
        let affected = self
            .conn
            .execute("DELETE FROM agents WHERE id = ?1", [id.as_str()])
            .map_err(storage)?;
        Ok(affected > 0)
    }

    fn list(&self, filter: &AgentFilter) -> Result<Vec<AgentRecord>, AgentError> {
        let mut sql = format!("SELECT {AGENT_COLUMNS} FROM agents");
        let mut clauses = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(archived) = filter.archived {
            clauses.push(format!("archived = ?{}", params.len() + 1));
            params.push(Box::new(archived));
        }
        if let Some(user_id) = &filter.user_id {
            clauses.push(format!("user_id = ?{}", params.len() + 1));
            params.push(Box::new(user_id.clone()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");
        let mut stmt = self.conn.prepare(&sql).map_err(storage)?;
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter().map(AsRef::as_ref)))
            .map_err(storage)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(storage)? {
            records.push(map_agent_row(row)?);
        }
        Ok(records)
    }

    fn list_active(&self) -> Result<Vec<AgentRecord>, AgentError> {
        let sql = format!(
            "SELECT {} FROM agents a JOIN agent_active x ON x.agent_id = a.id ORDER BY a.created_at ASC",
            AGENT_COLUMNS
                .split(", ")
                .map(|column| format!("a.{column}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = self.conn.prepare(&sql).map_err(storage)?;
        let mut rows = stmt.query([]).map_err(storage)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(storage)? {
            records.push(map_agent_row(row)?);
        }
        Ok(records)
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<AgentRecord>, AgentError> {
        let sql =
            format!("SELECT {AGENT_COLUMNS} FROM agents WHERE user_id = ?1 ORDER BY created_at DESC");
        let mut stmt = self.conn.prepare(&sql).map_err(storage)?;
        let mut rows = stmt.query([user_id]).map_err(storage)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(storage)? {
            records.push(map_agent_row(row)?);
        }
        Ok(records)
    }
}

fn map_agent_row(row: &rusqlite::Row<'_>) -> Result<AgentRecord, AgentError> {
    let id: String = row.get(0).map_err(storage)?;
    let channel_id: String = row.get(1).map_err(storage)?;
    let post_id: String = row.get(2).map_err(storage)?;
    let user_id: String = row.get(3).map_err(storage)?;
    let status: String = row.get(4).map_err(storage)?;
    let role: String = row.get(5).map_err(storage)?;
    let repo: String = row.get(6).map_err(storage)?;
    let branch: Option<String> = row.get(7).map_err(storage)?;
    let target_branch: Option<String> = row.get(8).map_err(storage)?;
    let prompt: String = row.get(9).map_err(storage)?;
    let model: Option<String> = row.get(10).map_err(storage)?;
    let pr_url: Option<String> = row.get(11).map_err(storage)?;
    let summary: Option<String> = row.get(12).map_err(storage)?;
    let workflow_id: Option<String> = row.get(13).map_err(storage)?;
    let review_loop_id: Option<String> = row.get(14).map_err(storage)?;
    let archived: bool = row.get(15).map_err(storage)?;
    let created_at: String = row.get(16).map_err(storage)?;
    let updated_at: String = row.get(17).map_err(storage)?;

    Ok(AgentRecord {
        id: AgentId::from_str(&id).map_err(storage)?,
        origin: Origin {
            channel_id,
            post_id,
            user_id,
        },
        status: decode_enum(&status).map_err(storage)?,
        role: decode_enum(&role).map_err(storage)?,
        repo,
        branch,
        target_branch,
        prompt,
        model,
        pr_url,
        summary,
        workflow_id: workflow_id
            .map(|value| WorkflowId::from_str(&value))
            .transpose()
            .map_err(storage)?,
        review_loop_id: review_loop_id
            .map(|value| ReviewLoopId::from_str(&value))
            .transpose()
            .map_err(storage)?,
        archived,
        created_at: from_rfc3339(&created_at).map_err(storage)?,
        updated_at: from_rfc3339(&updated_at).map_err(storage)?,
    })
}
