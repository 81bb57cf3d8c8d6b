use crate::util::{decode_enum, decode_json, encode_enum, encode_json, from_rfc3339, to_rfc3339};
use fm_core::error::EventError;
use fm_core::events::EventRepository;
use fm_events::types::EventRecord;
use rusqlite::Connection;
use std::sync::MutexGuard;
use ulid::Ulid;

pub struct EventRepo<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl<'a> EventRepo<'a> {
    pub fn new(conn: MutexGuard<'a, Connection>) -> Self {
        Self { conn }
    }
}

fn storage(err: impl std::fmt::Display) -> EventError {
    EventError::Storage {
        message: err.to_string(),
    }
}

impl<'a> EventRepository for EventRepo<'a> {
    fn append(&self, mut event: EventRecord) -> Result<EventRecord, EventError> {
        event.seq = next_seq(&self.conn)?;
        event.id = format!("evt_{}", Ulid::new());
        let sql = "INSERT INTO events (id, seq, at, correlation_id, source, body_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
        let params = rusqlite::params![
            event.id,
            event.seq,
            to_rfc3339(&event.at),
            event.correlation_id,
            encode_enum(&event.source).map_err(storage)?,
            encode_json(&event.body).map_err(storage)?,
        ];
        self.conn.execute(sql, params).map_err(storage)?;
        Ok(event)
    }

    fn list(&self, after: Option<i64>, limit: Option<u32>) -> Result<Vec<EventRecord>, EventError> {
        let mut sql =
            "SELECT id, seq, at, correlation_id, source, body_json FROM events".to_string();
        if after.is_some() {
            sql.push_str(" WHERE seq > ?1");
        }
        sql.push_str(" ORDER BY seq ASC");
        if limit.is_some() {
            sql.push_str(if after.is_some() { " LIMIT ?2" } else { " LIMIT ?1" });
        }
        let mut stmt = self.conn.prepare(&sql).map_err(storage)?;
        let mut rows = match (after, limit) {
            (Some(after), Some(limit)) => stmt
                .query(rusqlite::params![after, limit])
                .map_err(storage)?,
            (Some(after), None) => stmt.query(rusqlite::params![after]).map_err(storage)?,
            (None, Some(limit)) => stmt.query(rusqlite::params![limit]).map_err(storage)?,
            (None, None) => stmt.query([]).map_err(storage)?,
        };
        let mut events = Vec::new();
        while let Some(row) = rows.next().map_err(storage)? {
            events.push(map_event_row(row)?);
        }
        Ok(events)
    }
}

fn map_event_row(row: &rusqlite::Row<'_>) -> Result<EventRecord, EventError> {
    let id: String = row.get(0).map_err(storage)?;
    let seq: i64 = row.get(1).map_err(storage)?;
    let at: String = row.get(2).map_err(storage)?;
    let correlation_id: Option<String> = row.get(3).map_err(storage)?;
    let source: String = row.get(4).map_err(storage)?;
    let body_json: String = row.get(5).map_err(storage)?;

    Ok(EventRecord {
        id,
        seq,
        at: from_rfc3339(&at).map_err(storage)?,
        correlation_id,
        source: decode_enum(&source).map_err(storage)?,
        body: decode_json(&body_json).map_err(storage)?,
    })
}

fn next_seq(conn: &Connection) -> Result<i64, EventError> {
    let mut stmt = conn
        .prepare("SELECT COALESCE(MAX(seq), 0) FROM events")
        .map_err(storage)?;
    let seq: i64 = stmt.query_row([], |row| row.get(0)).map_err(storage)?;
    Ok(seq + 1)
}
