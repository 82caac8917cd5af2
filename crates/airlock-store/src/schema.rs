//! Schema creation and the append-only column migration runner.

use rusqlite::Connection;

use crate::StoreResult;

/// Column additions applied after the base schema. Append only; never edit
/// or reorder an entry that has shipped.
const COLUMN_MIGRATIONS: &[&str] = &[
    "ALTER TABLE profiles ADD COLUMN network_allowlist TEXT",
    "ALTER TABLE executions ADD COLUMN redacted INTEGER NOT NULL DEFAULT 0",
];

/// Creates all tables and indexes when absent.
pub(crate) fn initialize_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS credentials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            value_enc BLOB,
            created_at_unix_ms INTEGER NOT NULL,
            updated_at_unix_ms INTEGER
        );
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            description TEXT NOT NULL DEFAULT '',
            locked INTEGER NOT NULL DEFAULT 0,
            key_id TEXT UNIQUE,
            key_secret_enc BLOB,
            expires_at_unix_ms INTEGER,
            revoked INTEGER NOT NULL DEFAULT 0,
            created_at_unix_ms INTEGER NOT NULL,
            updated_at_unix_ms INTEGER,
            last_used_at_unix_ms INTEGER
        );
        CREATE TABLE IF NOT EXISTS profile_credentials (
            profile_id TEXT NOT NULL REFERENCES profiles(id),
            credential_id INTEGER NOT NULL REFERENCES credentials(id),
            UNIQUE(profile_id, credential_id)
        );
        CREATE INDEX IF NOT EXISTS idx_profile_credentials_credential
            ON profile_credentials(credential_id);
        CREATE TABLE IF NOT EXISTS executions (
            id TEXT PRIMARY KEY,
            profile_id TEXT NOT NULL,
            script TEXT NOT NULL,
            status TEXT NOT NULL,
            result_json TEXT,
            stdout TEXT NOT NULL DEFAULT '',
            stderr TEXT NOT NULL DEFAULT '',
            error TEXT,
            execution_time_ms INTEGER,
            created_at_unix_ms INTEGER NOT NULL,
            completed_at_unix_ms INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_executions_profile
            ON executions(profile_id, created_at_unix_ms);
        CREATE TABLE IF NOT EXISTS admin (
            key TEXT PRIMARY KEY,
            value TEXT
        );
        "#,
    )?;
    Ok(())
}

/// Applies append-only column additions, ignoring "duplicate column name"
/// failures so re-runs are idempotent.
pub(crate) fn run_column_migrations(conn: &Connection) -> StoreResult<()> {
    for statement in COLUMN_MIGRATIONS {
        match conn.execute_batch(statement) {
            Ok(()) => {}
            Err(error) if is_duplicate_column(&error) => {}
            Err(error) => return Err(error.into()),
        }
    }
    Ok(())
}

fn is_duplicate_column(error: &rusqlite::Error) -> bool {
    error.to_string().contains("duplicate column name")
}
