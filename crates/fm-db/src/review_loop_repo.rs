use crate::util::{decode_enum, encode_enum, from_rfc3339, to_rfc3339};
use fm_core::error::ReviewLoopError;
use fm_core::normalize::{normalize_branch, normalize_pr_url};
use fm_core::review_loops::ReviewLoopRepository;
use fm_core::types::ids::{AgentId, ReviewLoopId};
use fm_core::types::review_loop::{ReviewLoopHistoryEntry, ReviewLoopRecord};
use rusqlite::Connection;
use std::sync::MutexGuard;
use std::str::FromStr;

const LOOP_COLUMNS: &str = "id, agent_id, pr_url, branch, phase, iteration, created_at, updated_at";

pub struct ReviewLoopRepo<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> ReviewLoopRepo<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }
}

fn storage(err: impl std::fmt::Display) -> ReviewLoopError {
    ReviewLoopError::Storage {
        message: err.to_string(),
    }
}

impl<'a> ReviewLoopRepository for ReviewLoopRepo<'a> {
    fn get(&self, id: &ReviewLoopId) -> Result<Option<ReviewLoopRecord>, ReviewLoopError> {
        let sql = format!("SELECT {LOOP_COLUMNS} FROM review_loops WHERE id = ?1");
        self.query_one(&sql, [id.as_str()])
    }

    fn save(&self, record: &ReviewLoopRecord) -> Result<(), ReviewLoopError> {
        // Lookup keys are derived on every save so the indexed form can
        // never drift from the stored URL and branch.
        let sql = "INSERT OR REPLACE INTO review_loops (id, agent_id, pr_url, pr_url_key, branch, branch_key, phase, iteration, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";
        let params = rusqlite::params![
            record.id.as_str(),
            record.agent_id.as_str(),
            record.pr_url,
            normalize_pr_url(&record.pr_url),
            record.branch,
            record.branch.as_deref().map(normalize_branch),
            encode_enum(&record.phase).map_err(storage)?,
            record.iteration,
            to_rfc3339(&record.created_at),
            to_rfc3339(&record.updated_at),
        ];
        self.conn.execute(sql, params).map_err(storage)?;
        Ok(())
    }

    fn delete(&self, id: &ReviewLoopId) -> Result<bool, ReviewLoopError> {
        self.conn
            .execute(
                "DELETE FROM review_loop_history WHERE loop_id = ?1",
                [id.as_str()],
            )
            .map_err(storage)?;
        let affected = self
            .conn
            .execute("DELETE FROM review_loops WHERE id = ?1", [id.as_str()])
            .map_err(storage)?;
        Ok(affected > 0)
    }

    fn find_by_pr_url(
        &self,
        pr_url_key: &str,
    ) -> Result<Option<ReviewLoopRecord>, ReviewLoopError> {
        let sql = format!("SELECT {LOOP_COLUMNS} FROM review_loops WHERE pr_url_key = ?1");
        self.query_one(&sql, [pr_url_key])
    }

    fn find_by_branch(
        &self,
        branch_key: &str,
    ) -> Result<Option<ReviewLoopRecord>, ReviewLoopError> {
        let sql = format!(
            "SELECT {LOOP_COLUMNS} FROM review_loops WHERE branch_key = ?1 ORDER BY created_at DESC LIMIT 1"
        );
        self.query_one(&sql, [branch_key])
    }

    fn append_history(&self, entry: &ReviewLoopHistoryEntry) -> Result<(), ReviewLoopError> {
        let sql =
            "INSERT INTO review_loop_history (loop_id, phase, detail, at) VALUES (?1, ?2, ?3, ?4)";
        let params = rusqlite::params![
            entry.loop_id.as_str(),
            encode_enum(&entry.phase).map_err(storage)?,
            entry.detail,
            to_rfc3339(&entry.at),
        ];
        self.conn.execute(sql, params).map_err(storage)?;
        Ok(())
    }

    fn history(
        &self,
        id: &ReviewLoopId,
    ) -> Result<Vec<ReviewLoopHistoryEntry>, ReviewLoopError> {
        let mut stmt = self
            .conn
            .prepare("SELECT loop_id, phase, detail, at FROM review_loop_history WHERE loop_id = ?1 ORDER BY id ASC")
            .map_err(storage)?;
        let mut rows = stmt.query([id.as_str()]).map_err(storage)?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().map_err(storage)? {
            let loop_id: String = row.get(0).map_err(storage)?;
            let phase: String = row.get(1).map_err(storage)?;
            let detail: String = row.get(2).map_err(storage)?;
            let at: String = row.get(3).map_err(storage)?;
            entries.push(ReviewLoopHistoryEntry {
                loop_id: ReviewLoopId::from_str(&loop_id).map_err(storage)?,
                phase: decode_enum(&phase).map_err(storage)?,
                detail,
                at: from_rfc3339(&at).map_err(storage)?,
            });
        }
        Ok(entries)
    }
}

impl<'a> ReviewLoopRepo<'a> {
    fn query_one(
        &self,
        sql: &str,
        params: [&str; 1],
    ) -> Result<Option<ReviewLoopRecord>, ReviewLoopError> {
        let mut stmt = self.conn.prepare(sql).map_err(storage)?;
        let mut rows = stmt.query(params).map_err(storage)?;
        let Some(row) = rows.next().map_err(storage)? else {
            return Ok(None);
        };
        map_loop_row(row).map(Some)
    }
}

fn map_loop_row(row: &rusqlite::Row<'_>) -> Result<ReviewLoopRecord, ReviewLoopError> {
    let id: String = row.get(0).map_err(storage)?;
    let agent_id: String = row.get(1).map_err(storage)?;
    let pr_url: String = row.get(2).map_err(storage)?;
    let branch: Option<String> = row.get(3).map_err(storage)?;
    let phase: String = row.get(4).map_err(storage)?;
    let iteration: u32 = row.get(5).map_err(storage)?;
    let created_at: String = row.get(6).map_err(storage)?;
    let updated_at: String = row.get(7).map_err(storage)?;

    Ok(ReviewLoopRecord {
        id: ReviewLoopId::from_str(&id).map_err(storage)?,
        agent_id: AgentId::from_str(&agent_id).map_err(storage)?,
        pr_url,
        branch,
        phase: decode_enum(&phase).map_err(storage)?,
        iteration,
        created_at: from_rfc3339(&created_at).map_err(storage)?,
        updated_at: from_rfc3339(&updated_at).map_err(storage)?,
    })
}
