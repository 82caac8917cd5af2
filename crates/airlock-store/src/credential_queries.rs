//! Credential-slot and binding queries.

use airlock_core::ValuePatch;
use rusqlite::{params, OptionalExtension};

use crate::{is_unique_violation, CredentialRow, Store, StoreError, StoreResult};

impl Store {
    /// Check-then-insert on the unique name; `NameTaken` on collision.
    pub fn insert_credential(
        &self,
        name: &str,
        description: &str,
        value_enc: Option<&[u8]>,
        now_unix_ms: u64,
    ) -> StoreResult<CredentialRow> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                r#"
                INSERT INTO credentials (name, description, value_enc, created_at_unix_ms)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![name, description, value_enc, now_unix_ms],
            );
            match inserted {
                Ok(_) => {}
                Err(error) if is_unique_violation(&error) => return Err(StoreError::NameTaken),
                Err(error) => return Err(error.into()),
            }
            conn.query_row(
                "SELECT * FROM credentials WHERE name = ?1",
                params![name],
                CredentialRow::from_row,
            )
            .map_err(StoreError::from)
        })
    }

    pub fn get_credential(&self, name: &str) -> StoreResult<Option<CredentialRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM credentials WHERE name = ?1",
                params![name],
                CredentialRow::from_row,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    pub fn list_credentials(&self) -> StoreResult<Vec<CredentialRow>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare("SELECT * FROM credentials ORDER BY name ASC")?;
            let rows = statement.query_map([], CredentialRow::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
    }

    /// Partial update of description and/or encrypted value: read, merge
    /// the patch, write once. Returns the refreshed row; `NotFound` when
    /// the slot does not exist.
    pub fn update_credential(
        &self,
        name: &str,
        description: Option<&str>,
        value_enc: ValuePatch<Vec<u8>>,
        now_unix_ms: u64,
    ) -> StoreResult<CredentialRow> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM credentials WHERE name = ?1",
                    params![name],
                    CredentialRow::from_row,
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;
            if description.is_none() && value_enc.is_unchanged() {
                return Ok(row);
            }
            let description = description.unwrap_or(&row.description);
            let value_enc = value_enc.apply(row.value_enc.clone());
            conn.execute(
                r#"
                UPDATE credentials
                SET description = ?2, value_enc = ?3, updated_at_unix_ms = ?4
                WHERE name = ?1
                "#,
                params![name, description, value_enc, now_unix_ms],
            )?;
            conn.query_row(
                "SELECT * FROM credentials WHERE name = ?1",
                params![name],
                CredentialRow::from_row,
            )
            .map_err(StoreError::from)
        })
    }

    /// Profile ids of LOCKED (not revoked) profiles referencing the slot.
    pub fn locked_profiles_referencing(&self, credential_id: i64) -> StoreResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                r#"
                SELECT p.id
                FROM profiles p
                JOIN profile_credentials pc ON pc.profile_id = p.id
                WHERE pc.credential_id = ?1 AND p.locked = 1 AND p.revoked = 0
                ORDER BY p.id ASC
                "#,
            )?;
            let rows = statement.query_map(params![credential_id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()
                .map_err(StoreError::from)
        })
    }

    /// Deletes the slot and every binding that points at it in one
    /// transaction. The caller enforces the locked-profile guard first.
    pub fn delete_credential_with_bindings(&self, credential_id: i64) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let transaction = conn.transaction()?;
            transaction.execute(
                "DELETE FROM profile_credentials WHERE credential_id = ?1",
                params![credential_id],
            )?;
            let deleted = transaction.execute(
                "DELETE FROM credentials WHERE id = ?1",
                params![credential_id],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound);
            }
            transaction.commit()?;
            Ok(())
        })
    }

    /// Idempotent binding insert.
    pub fn add_profile_credentials(
        &self,
        profile_id: &str,
        credential_ids: &[i64],
    ) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let transaction = conn.transaction()?;
            for credential_id in credential_ids {
                transaction.execute(
                    r#"
                    INSERT INTO profile_credentials (profile_id, credential_id)
                    VALUES (?1, ?2)
                    ON CONFLICT(profile_id, credential_id) DO NOTHING
                    "#,
                    params![profile_id, credential_id],
                )?;
            }
            transaction.commit()?;
            Ok(())
        })
    }

    /// Removes bindings; silently skips pairs that are not attached.
    pub fn remove_profile_credentials(
        &self,
        profile_id: &str,
        credential_ids: &[i64],
    ) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let transaction = conn.transaction()?;
            for credential_id in credential_ids {
                transaction.execute(
                    "DELETE FROM profile_credentials WHERE profile_id = ?1 AND credential_id = ?2",
                    params![profile_id, credential_id],
                )?;
            }
            transaction.commit()?;
            Ok(())
        })
    }

    /// Credential rows bound to the profile, ordered by name.
    pub fn list_profile_credentials(&self, profile_id: &str) -> StoreResult<Vec<CredentialRow>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                r#"
                SELECT c.*
                FROM credentials c
                JOIN profile_credentials pc ON pc.credential_id = c.id
                WHERE pc.profile_id = ?1
                ORDER BY c.name ASC
                "#,
            )?;
            let rows = statement.query_map(params![profile_id], CredentialRow::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
    }
}
