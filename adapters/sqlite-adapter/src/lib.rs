//! sqlite-adapter — SQLite implementations of the MemberRepository port.
//!
//! Purpose
//! - Persist members in a file-based database so the server keeps its data
//!   across restarts.
//! - Offer two interchangeable repositories over the same `member` table:
//!   [`direct::SqliteMemberRepository`] manages connection, statement and
//!   cursor by hand; [`template::TemplateMemberRepository`] goes through the
//!   [`template::SqlTemplate`] helper and a row mapper.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Both repositories acquire connections from a shared [`DataSource`].
//! - Statement cleanup failures are logged, never returned.

use std::ops::Deref;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use domain::{CoreError, MemberId};
use rusqlite::{Connection, Row, Statement};
use tracing::{debug, trace, warn};

pub mod direct;
pub mod template;

pub use direct::SqliteMemberRepository;
pub use template::{SimpleInsert, SqlTemplate, TemplateMemberRepository};

/// Failures raised by the SQL layer before they are folded into
/// [`CoreError::Repository`] at the port boundary.
#[derive(Debug, thiserror::Error)]
pub enum DataAccessError {
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("no generated key returned for insert into {table}")]
    MissingGeneratedKey { table: String },
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),
    #[error("invalid data access usage: {0}")]
    InvalidUsage(String),
}

impl From<DataAccessError> for CoreError {
    fn from(e: DataAccessError) -> Self {
        CoreError::Repository(e.to_string())
    }
}

/// Shared handle to the member database.
///
/// Owns a single connection; [`DataSource::connection`] hands it out behind a
/// guard that releases it when dropped.
pub struct DataSource {
    conn: Mutex<Connection>,
}

impl DataSource {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataAccessError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                DataAccessError::ConnectionUnavailable(format!("create {}: {e}", dir.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        debug!(path = %path.display(), "sqlite data source opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database; lives as long as the data source.
    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self, DataAccessError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection for the duration of one operation.
    pub fn connection(&self) -> Result<ConnectionGuard<'_>, DataAccessError> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| DataAccessError::ConnectionUnavailable("mutex poisoned".into()))?;
        trace!("connection acquired");
        Ok(ConnectionGuard { guard })
    }
}

/// Scoped connection borrowed from a [`DataSource`].
pub struct ConnectionGuard<'a> {
    guard: MutexGuard<'a, Connection>,
}

impl Deref for ConnectionGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.guard
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        trace!("connection released");
    }
}

fn init_schema(conn: &Connection) -> Result<(), DataAccessError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS member (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_member_name ON member(name);
        "#,
    )?;
    Ok(())
}

/// Finalize a statement, logging instead of raising on failure.
pub(crate) fn close_statement(stmt: Statement<'_>) {
    if let Err(e) = stmt.finalize() {
        warn!(err = %e, "failed to finalize statement");
    }
}

/// Column value to id; rowids handed out by AUTOINCREMENT are never negative.
pub(crate) fn id_from_raw(raw: i64) -> Result<MemberId, rusqlite::Error> {
    u64::try_from(raw)
        .map(MemberId::new)
        .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, raw))
}

/// Id to bind parameter; ids beyond the SQLite integer range cannot exist.
pub(crate) fn raw_from_id(id: MemberId) -> Option<i64> {
    i64::try_from(id.get()).ok()
}

pub(crate) fn id_column(row: &Row<'_>) -> Result<MemberId, rusqlite::Error> {
    id_from_raw(row.get("id")?)
}
