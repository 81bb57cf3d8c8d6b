use rusqlite::{Connection, Result};

const MIGRATION: &str = include_str!("../migrations/0001_init.sql");

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    Ok(())
}

pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    apply_pragmas(&conn)?;
    Ok(conn)
}

/// Single idempotent batch; every statement is CREATE .. IF NOT EXISTS,
/// so re-running against an existing database is safe.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATION)
}

pub fn open_and_migrate(path: &str) -> Result<Connection> {
    let conn = open(path)?;
    migrate(&conn)?;
    Ok(conn)
}

pub fn with_test_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    apply_pragmas(&conn)?;
    migrate(&conn)?;
    Ok(conn)
}
