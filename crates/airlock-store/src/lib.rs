//! SQLite persistence for Airlock: credentials, profiles, bindings, and
//! execution history.
//!
//! The store keeps single-writer discipline by funneling every access through
//! one mutex-guarded connection. State transitions that must be atomic
//! (locking a profile, revoking, deleting under the locked-profile guard) are
//! expressed as single guarded UPDATE/DELETE statements whose affected-row
//! count the caller checks.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use thiserror::Error;

mod credential_queries;
mod execution_queries;
mod profile_queries;
mod rows;
mod schema;

pub use rows::{CredentialRow, ExecutionRow, ProfileRow, ProfileState};

/// Typed failures of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("name is already taken")]
    NameTaken,
    #[error("stored value is corrupt: {0}")]
    Corrupt(String),
    #[error("store I/O failed: {0}")]
    Io(String),
    #[error("sqlite failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Mutex-guarded SQLite handle. Writes serialize through the mutex; the
/// schema and append-only column migrations run once at open.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if needed) the store at `path` with WAL journaling and
    /// a busy timeout, then ensures the schema is current.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|error| StoreError::Io(format!("cannot create store dir: {error}")))?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        schema::initialize_schema(&conn)?;
        schema::run_column_migrations(&conn)?;
        tracing::debug!(store = %path.display(), "opened airlock store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and ephemeral tooling.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize_schema(&conn)?;
        schema::run_column_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        op: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        op(&conn)
    }

    pub(crate) fn with_conn_mut<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        op(&mut conn)
    }
}

pub(crate) fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
