//! Execution history queries. A pending row is written at accept; the
//! terminal snapshot overwrites it when the dispatcher finishes; everything
//! in between lives in dispatcher memory only.

use rusqlite::{params, OptionalExtension};

use crate::{ExecutionRow, Store, StoreError, StoreResult};

impl Store {
    pub fn insert_execution_pending(
        &self,
        id: &str,
        profile_id: &str,
        script: &str,
        now_unix_ms: u64,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO executions (id, profile_id, script, status, created_at_unix_ms)
                VALUES (?1, ?2, ?3, 'pending', ?4)
                "#,
                params![id, profile_id, script, now_unix_ms],
            )?;
            Ok(())
        })
    }

    /// Persists a terminal snapshot over the pending row.
    pub fn finalize_execution(&self, row: &ExecutionRow) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                r#"
                UPDATE executions
                SET status = ?2,
                    result_json = ?3,
                    stdout = ?4,
                    stderr = ?5,
                    error = ?6,
                    execution_time_ms = ?7,
                    redacted = ?8,
                    completed_at_unix_ms = ?9
                WHERE id = ?1
                "#,
                params![
                    row.id,
                    row.status,
                    row.result_json,
                    row.stdout,
                    row.stderr,
                    row.error,
                    row.execution_time_ms,
                    row.redacted as i64,
                    row.completed_at_unix_ms,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    pub fn get_execution(&self, id: &str) -> StoreResult<Option<ExecutionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM executions WHERE id = ?1",
                params![id],
                ExecutionRow::from_row,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    /// Marks every persisted non-terminal execution as failed. Run once at
    /// dispatcher startup; in-flight state does not survive a restart.
    pub fn sweep_non_terminal_executions(
        &self,
        error_message: &str,
        now_unix_ms: u64,
    ) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let swept = conn.execute(
                r#"
                UPDATE executions
                SET status = 'error', error = ?1, completed_at_unix_ms = ?2
                WHERE status NOT IN ('completed', 'error', 'timeout')
                "#,
                params![error_message, now_unix_ms],
            )?;
            Ok(swept)
        })
    }
}
