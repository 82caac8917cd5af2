//! Profile lifecycle queries. State transitions are single guarded UPDATE
//! statements; the affected-row count tells the caller whether the guard
//! held.

use airlock_core::ValuePatch;
use rusqlite::{params, OptionalExtension};

use crate::{ProfileRow, Store, StoreError, StoreResult};

impl Store {
    pub fn insert_profile(
        &self,
        id: &str,
        description: &str,
        now_unix_ms: u64,
    ) -> StoreResult<ProfileRow> {
        self.with_conn(|conn| {
            conn.execute(
                r#"
                INSERT INTO profiles (id, description, created_at_unix_ms)
                VALUES (?1, ?2, ?3)
                "#,
                params![id, description, now_unix_ms],
            )?;
            conn.query_row(
                "SELECT * FROM profiles WHERE id = ?1",
                params![id],
                ProfileRow::from_row,
            )
            .map_err(StoreError::from)
        })
    }

    pub fn get_profile(&self, id: &str) -> StoreResult<Option<ProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM profiles WHERE id = ?1",
                params![id],
                ProfileRow::from_row,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    pub fn get_profile_by_key_id(&self, key_id: &str) -> StoreResult<Option<ProfileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM profiles WHERE key_id = ?1",
                params![key_id],
                ProfileRow::from_row,
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    pub fn list_profiles(&self) -> StoreResult<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let mut statement =
                conn.prepare("SELECT * FROM profiles ORDER BY created_at_unix_ms ASC, id ASC")?;
            let rows = statement.query_map([], ProfileRow::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(StoreError::from)
        })
    }

    /// Partial update of the operational knobs (description, expiry,
    /// network allowlist): read, merge the patches, write once. The caller
    /// enforces the not-revoked rule.
    pub fn update_profile_fields(
        &self,
        id: &str,
        description: Option<&str>,
        expires_at_unix_ms: ValuePatch<u64>,
        network_allowlist: ValuePatch<Vec<String>>,
        now_unix_ms: u64,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM profiles WHERE id = ?1",
                    params![id],
                    ProfileRow::from_row,
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;
            if description.is_none()
                && expires_at_unix_ms.is_unchanged()
                && network_allowlist.is_unchanged()
            {
                return Ok(());
            }
            let description = description.unwrap_or(&row.description);
            let expires_at_unix_ms = expires_at_unix_ms.apply(row.expires_at_unix_ms);
            let network_allowlist = network_allowlist
                .apply(row.network_allowlist.clone())
                .map(|hosts| {
                    serde_json::to_string(&hosts).map_err(|error| {
                        StoreError::Corrupt(format!("network allowlist is not encodable: {error}"))
                    })
                })
                .transpose()?;
            conn.execute(
                r#"
                UPDATE profiles
                SET description = ?2,
                    expires_at_unix_ms = ?3,
                    network_allowlist = ?4,
                    updated_at_unix_ms = ?5
                WHERE id = ?1
                "#,
                params![
                    id,
                    description,
                    expires_at_unix_ms,
                    network_allowlist,
                    now_unix_ms
                ],
            )?;
            Ok(())
        })
    }

    /// UNLOCKED → LOCKED. Returns false when the profile was not in
    /// UNLOCKED (or does not exist); the caller classifies.
    pub fn lock_profile(
        &self,
        id: &str,
        key_id: &str,
        key_secret_enc: &[u8],
        now_unix_ms: u64,
    ) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                r#"
                UPDATE profiles
                SET locked = 1, key_id = ?2, key_secret_enc = ?3, updated_at_unix_ms = ?4
                WHERE id = ?1 AND locked = 0 AND revoked = 0
                "#,
                params![id, key_id, key_secret_enc, now_unix_ms],
            )?;
            Ok(changed == 1)
        })
    }

    /// Any non-revoked state → REVOKED. Irreversible.
    pub fn revoke_profile(&self, id: &str, now_unix_ms: u64) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE profiles SET revoked = 1, updated_at_unix_ms = ?2 WHERE id = ?1 AND revoked = 0",
                params![id, now_unix_ms],
            )?;
            Ok(changed == 1)
        })
    }

    /// LOCKED → LOCKED with fresh key material. The old key_id stops
    /// resolving the moment this commits.
    pub fn regenerate_profile_key(
        &self,
        id: &str,
        key_id: &str,
        key_secret_enc: &[u8],
        now_unix_ms: u64,
    ) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                r#"
                UPDATE profiles
                SET key_id = ?2, key_secret_enc = ?3, updated_at_unix_ms = ?4
                WHERE id = ?1 AND locked = 1 AND revoked = 0
                "#,
                params![id, key_id, key_secret_enc, now_unix_ms],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn touch_profile_last_used(&self, id: &str, now_unix_ms: u64) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE profiles SET last_used_at_unix_ms = ?2 WHERE id = ?1",
                params![id, now_unix_ms],
            )?;
            Ok(())
        })
    }

    /// Deletes the profile and its bindings when UNLOCKED or REVOKED.
    /// Returns false when the guard rejected (locked and active).
    pub fn delete_profile_with_bindings(&self, id: &str) -> StoreResult<bool> {
        self.with_conn_mut(|conn| {
            let transaction = conn.transaction()?;
            let deletable: Option<i64> = transaction
                .query_row(
                    "SELECT 1 FROM profiles WHERE id = ?1 AND (locked = 0 OR revoked = 1)",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            if deletable.is_none() {
                return Ok(false);
            }
            transaction.execute(
                "DELETE FROM profile_credentials WHERE profile_id = ?1",
                params![id],
            )?;
            transaction.execute("DELETE FROM profiles WHERE id = ?1", params![id])?;
            transaction.commit()?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use airlock_core::ValuePatch;

    use crate::{ProfileState, Store};

    #[test]
    fn lock_guard_rejects_double_lock() {
        let store = Store::open_in_memory().expect("store");
        store.insert_profile("p1", "", 1_000).expect("insert");
        assert!(store
            .lock_profile("p1", "ark_aaaaaaaaaaaaaaaaaaaaaaaa", b"enc", 2_000)
            .expect("first lock"));
        assert!(!store
            .lock_profile("p1", "ark_bbbbbbbbbbbbbbbbbbbbbbbb", b"enc", 3_000)
            .expect("second lock"));
    }

    #[test]
    fn revoke_is_terminal_and_single_shot() {
        let store = Store::open_in_memory().expect("store");
        store.insert_profile("p1", "", 1_000).expect("insert");
        assert!(store.revoke_profile("p1", 2_000).expect("revoke"));
        assert!(!store.revoke_profile("p1", 3_000).expect("re-revoke"));
        let row = store.get_profile("p1").expect("get").expect("row");
        assert_eq!(row.state(), ProfileState::Revoked);
    }

    #[test]
    fn regenerate_requires_locked_active() {
        let store = Store::open_in_memory().expect("store");
        store.insert_profile("p1", "", 1_000).expect("insert");
        assert!(!store
            .regenerate_profile_key("p1", "ark_cccccccccccccccccccccccc", b"enc", 2_000)
            .expect("regenerate unlocked"));
        store
            .lock_profile("p1", "ark_aaaaaaaaaaaaaaaaaaaaaaaa", b"enc", 2_000)
            .expect("lock");
        assert!(store
            .regenerate_profile_key("p1", "ark_cccccccccccccccccccccccc", b"enc2", 3_000)
            .expect("regenerate locked"));
        let row = store.get_profile("p1").expect("get").expect("row");
        assert_eq!(row.key_id.as_deref(), Some("ark_cccccccccccccccccccccccc"));
        assert_eq!(row.key_secret_enc.as_deref(), Some(b"enc2".as_slice()));
    }

    #[test]
    fn delete_guard_blocks_locked_active_profile() {
        let store = Store::open_in_memory().expect("store");
        store.insert_profile("p1", "", 1_000).expect("insert");
        store
            .lock_profile("p1", "ark_aaaaaaaaaaaaaaaaaaaaaaaa", b"enc", 2_000)
            .expect("lock");
        assert!(!store.delete_profile_with_bindings("p1").expect("blocked"));
        store.revoke_profile("p1", 3_000).expect("revoke");
        assert!(store.delete_profile_with_bindings("p1").expect("allowed"));
        assert!(store.get_profile("p1").expect("get").is_none());
    }

    #[test]
    fn network_allowlist_round_trips_as_json() {
        let store = Store::open_in_memory().expect("store");
        store.insert_profile("p1", "", 1_000).expect("insert");
        store
            .update_profile_fields(
                "p1",
                None,
                ValuePatch::Unchanged,
                ValuePatch::Set(vec!["api.example.com".to_string()]),
                2_000,
            )
            .expect("update");
        let row = store.get_profile("p1").expect("get").expect("row");
        assert_eq!(
            row.network_allowlist.as_deref(),
            Some(["api.example.com".to_string()].as_slice())
        );
    }

    #[test]
    fn expiry_patch_clears_and_sets() {
        let store = Store::open_in_memory().expect("store");
        store.insert_profile("p1", "", 1_000).expect("insert");
        store
            .update_profile_fields(
                "p1",
                None,
                ValuePatch::Set(9_999),
                ValuePatch::Unchanged,
                2_000,
            )
            .expect("set expiry");
        let row = store.get_profile("p1").expect("get").expect("row");
        assert_eq!(row.expires_at_unix_ms, Some(9_999));
        store
            .update_profile_fields(
                "p1",
                None,
                ValuePatch::Clear,
                ValuePatch::Unchanged,
                3_000,
            )
            .expect("clear expiry");
        let row = store.get_profile("p1").expect("get").expect("row");
        assert_eq!(row.expires_at_unix_ms, None);
    }
}
