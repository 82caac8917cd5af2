//! Profile lifecycle and per-request identity.
//!
//! A profile bundles a set of credential references behind a two-part key.
//! It is assembled while UNLOCKED, sealed by `lock` (which mints the key
//! pair), and retired by `revoke`. Execution authenticates with the key id
//! and proves possession of the secret through an HMAC over the submitted
//! script.

use std::fmt;
use std::sync::Arc;

use airlock_core::{current_unix_timestamp_ms, ValuePatch};
use airlock_crypto::{CryptoError, MasterKey};
use airlock_store::{ProfileRow, ProfileState, Store, StoreError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

mod auth;
mod keys;
mod signature;

pub use auth::{AuthError, AuthenticatedProfile};
pub use keys::{
    is_well_formed_key_id, ProfileKeyPair, KEY_ID_CHARS, KEY_ID_PREFIX, KEY_ID_RANDOM_CHARS,
    KEY_SECRET_CHARS,
};
pub use signature::{sign_script, verify_script};

/// Typed failures of the profile service.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile '{0}' not found")]
    NotFound(String),
    #[error("profile '{0}' is locked; credential references are frozen")]
    Locked(String),
    #[error("profile '{0}' is already locked")]
    AlreadyLocked(String),
    #[error("profile '{0}' is not locked")]
    NotLocked(String),
    #[error("profile '{0}' has been revoked")]
    Revoked(String),
    #[error("profile '{0}' is already revoked")]
    AlreadyRevoked(String),
    #[error("profile '{0}' is locked and active; revoke it before deleting")]
    LockedActive(String),
    #[error("credential '{0}' does not exist")]
    UnknownCredential(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Credential reference as projected into profile metadata.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialRef {
    pub name: String,
    pub description: String,
    pub value_exists: bool,
}

/// Full profile metadata. Timestamps are unix milliseconds; the key secret
/// never appears here.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileDetails {
    pub id: String,
    pub description: String,
    pub locked: bool,
    pub key_id: Option<String>,
    pub credentials: Vec<CredentialRef>,
    pub expires_at: Option<u64>,
    pub revoked: bool,
    pub network_allowlist: Option<Vec<String>>,
    pub created_at: u64,
    pub updated_at: Option<u64>,
    pub last_used_at: Option<u64>,
}

/// The result of `lock` and `regenerate_key`: metadata plus the one-time
/// full key string. `Debug` stays redacted.
#[derive(Clone, Serialize)]
pub struct IssuedProfileKey {
    pub profile: ProfileDetails,
    pub key: String,
}

impl fmt::Debug for IssuedProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedProfileKey")
            .field("profile", &self.profile.id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Service over the profile table. Cheap to clone.
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<Store>,
    master_key: MasterKey,
}

impl ProfileService {
    pub fn new(store: Arc<Store>, master_key: MasterKey) -> Self {
        Self { store, master_key }
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn master_key(&self) -> &MasterKey {
        &self.master_key
    }

    fn details(&self, row: ProfileRow) -> Result<ProfileDetails, ProfileError> {
        let credentials = self
            .store
            .list_profile_credentials(&row.id)?
            .into_iter()
            .map(|credential| CredentialRef {
                value_exists: credential.value_exists(),
                name: credential.name,
                description: credential.description,
            })
            .collect();
        Ok(ProfileDetails {
            id: row.id,
            description: row.description,
            locked: row.locked,
            key_id: row.key_id,
            credentials,
            expires_at: row.expires_at_unix_ms,
            revoked: row.revoked,
            network_allowlist: row.network_allowlist,
            created_at: row.created_at_unix_ms,
            updated_at: row.updated_at_unix_ms,
            last_used_at: row.last_used_at_unix_ms,
        })
    }

    fn require_row(&self, id: &str) -> Result<ProfileRow, ProfileError> {
        self.store
            .get_profile(id)?
            .ok_or_else(|| ProfileError::NotFound(id.to_string()))
    }

    pub fn list(&self) -> Result<Vec<ProfileDetails>, ProfileError> {
        let rows = self.store.list_profiles()?;
        rows.into_iter().map(|row| self.details(row)).collect()
    }

    pub fn get(&self, id: &str) -> Result<ProfileDetails, ProfileError> {
        let row = self.require_row(id)?;
        self.details(row)
    }

    /// Creates a fresh UNLOCKED profile with an opaque UUID id.
    pub fn create(&self, description: &str) -> Result<ProfileDetails, ProfileError> {
        let id = Uuid::new_v4().to_string();
        let row = self
            .store
            .insert_profile(&id, description, current_unix_timestamp_ms())?;
        tracing::info!(profile = %id, "profile created");
        self.details(row)
    }

    /// Updates the operational knobs. Allowed even when LOCKED (expiry and
    /// description stay adjustable); forbidden once REVOKED.
    pub fn update(
        &self,
        id: &str,
        description: Option<&str>,
        expires_at: ValuePatch<u64>,
        network_allowlist: ValuePatch<Vec<String>>,
    ) -> Result<ProfileDetails, ProfileError> {
        let row = self.require_row(id)?;
        if row.revoked {
            return Err(ProfileError::Revoked(id.to_string()));
        }
        self.store.update_profile_fields(
            id,
            description,
            expires_at,
            network_allowlist,
            current_unix_timestamp_ms(),
        )?;
        self.get(id)
    }

    /// Attaches credential slots by name. UNLOCKED only; idempotent.
    pub fn add_credentials(
        &self,
        id: &str,
        names: &[String],
    ) -> Result<ProfileDetails, ProfileError> {
        let row = self.require_row(id)?;
        self.require_unlocked(&row)?;
        let credential_ids = self.resolve_credential_ids(names, true)?;
        self.store.add_profile_credentials(id, &credential_ids)?;
        tracing::info!(profile = %id, attached = credential_ids.len(), "credentials attached");
        self.get(id)
    }

    /// Detaches credential slots by name. UNLOCKED only; names that exist
    /// but are not attached are skipped silently.
    pub fn remove_credentials(
        &self,
        id: &str,
        names: &[String],
    ) -> Result<ProfileDetails, ProfileError> {
        let row = self.require_row(id)?;
        self.require_unlocked(&row)?;
        let credential_ids = self.resolve_credential_ids(names, true)?;
        self.store.remove_profile_credentials(id, &credential_ids)?;
        tracing::info!(profile = %id, detached = credential_ids.len(), "credentials detached");
        self.get(id)
    }

    /// UNLOCKED → LOCKED: mints the key pair, seals the secret, and returns
    /// the full key string. This is one of exactly two places the secret is
    /// ever surfaced.
    pub fn lock(&self, id: &str) -> Result<IssuedProfileKey, ProfileError> {
        let row = self.require_row(id)?;
        match row.state() {
            ProfileState::Revoked => return Err(ProfileError::Revoked(id.to_string())),
            ProfileState::Locked => return Err(ProfileError::AlreadyLocked(id.to_string())),
            ProfileState::Unlocked => {}
        }
        let pair = ProfileKeyPair::generate();
        let secret_enc = self.master_key.encrypt_str(&pair.secret)?;
        let transitioned = self.store.lock_profile(
            id,
            &pair.key_id,
            &secret_enc,
            current_unix_timestamp_ms(),
        )?;
        if !transitioned {
            // Lost a race with a concurrent transition; re-read and classify.
            return Err(self.classify_lock_conflict(id));
        }
        tracing::info!(profile = %id, key_id = %pair.key_id, "profile locked");
        Ok(IssuedProfileKey {
            profile: self.get(id)?,
            key: pair.full_key(),
        })
    }

    /// Any non-revoked state → REVOKED. Irreversible; running executions
    /// finish, new requests stop authenticating immediately.
    pub fn revoke(&self, id: &str) -> Result<ProfileDetails, ProfileError> {
        let row = self.require_row(id)?;
        if row.revoked {
            return Err(ProfileError::AlreadyRevoked(id.to_string()));
        }
        if !self.store.revoke_profile(id, current_unix_timestamp_ms())? {
            return Err(ProfileError::AlreadyRevoked(id.to_string()));
        }
        tracing::info!(profile = %id, "profile revoked");
        self.get(id)
    }

    /// LOCKED → LOCKED with fresh key material. The previous key id stops
    /// authenticating the moment the swap commits.
    pub fn regenerate_key(&self, id: &str) -> Result<IssuedProfileKey, ProfileError> {
        let row = self.require_row(id)?;
        match row.state() {
            ProfileState::Revoked => return Err(ProfileError::Revoked(id.to_string())),
            ProfileState::Unlocked => return Err(ProfileError::NotLocked(id.to_string())),
            ProfileState::Locked => {}
        }
        let pair = ProfileKeyPair::generate();
        let secret_enc = self.master_key.encrypt_str(&pair.secret)?;
        let transitioned = self.store.regenerate_profile_key(
            id,
            &pair.key_id,
            &secret_enc,
            current_unix_timestamp_ms(),
        )?;
        if !transitioned {
            return Err(ProfileError::NotLocked(id.to_string()));
        }
        tracing::info!(profile = %id, key_id = %pair.key_id, "profile key regenerated");
        Ok(IssuedProfileKey {
            profile: self.get(id)?,
            key: pair.full_key(),
        })
    }

    /// Deletes a profile in UNLOCKED or REVOKED; a locked active profile
    /// must be revoked first.
    pub fn delete(&self, id: &str) -> Result<(), ProfileError> {
        self.require_row(id)?;
        if !self.store.delete_profile_with_bindings(id)? {
            return Err(ProfileError::LockedActive(id.to_string()));
        }
        tracing::info!(profile = %id, "profile deleted");
        Ok(())
    }

    fn require_unlocked(&self, row: &ProfileRow) -> Result<(), ProfileError> {
        match row.state() {
            ProfileState::Unlocked => Ok(()),
            ProfileState::Locked => Err(ProfileError::Locked(row.id.clone())),
            ProfileState::Revoked => Err(ProfileError::Revoked(row.id.clone())),
        }
    }

    fn resolve_credential_ids(
        &self,
        names: &[String],
        require_known: bool,
    ) -> Result<Vec<i64>, ProfileError> {
        let mut credential_ids = Vec::with_capacity(names.len());
        for name in names {
            match self.store.get_credential(name)? {
                Some(row) => credential_ids.push(row.id),
                None if require_known => {
                    return Err(ProfileError::UnknownCredential(name.clone()));
                }
                None => {}
            }
        }
        Ok(credential_ids)
    }

    fn classify_lock_conflict(&self, id: &str) -> ProfileError {
        match self.store.get_profile(id) {
            Ok(Some(row)) if row.revoked => ProfileError::Revoked(id.to_string()),
            Ok(Some(row)) if row.locked => ProfileError::AlreadyLocked(id.to_string()),
            Ok(Some(_)) | Ok(None) => ProfileError::NotFound(id.to_string()),
            Err(error) => ProfileError::Store(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use airlock_core::ValuePatch;
    use airlock_crypto::MasterKey;
    use airlock_store::Store;
    use tempfile::tempdir;

    use super::{ProfileError, ProfileService, KEY_ID_CHARS, KEY_SECRET_CHARS};

    fn service() -> (ProfileService, Arc<Store>) {
        let dir = tempdir().expect("tempdir");
        let master_key = MasterKey::load_or_create(&dir.path().join("master.key")).expect("key");
        let store = Arc::new(Store::open_in_memory().expect("store"));
        (ProfileService::new(store.clone(), master_key), store)
    }

    #[test]
    fn create_starts_unlocked_with_uuid_id() {
        let (service, _store) = service();
        let profile = service.create("runner").expect("create");
        assert!(!profile.locked);
        assert!(!profile.revoked);
        assert!(profile.key_id.is_none());
        assert_eq!(profile.id.len(), 36);
    }

    #[test]
    fn lock_issues_full_key_exactly_once() {
        let (service, _store) = service();
        let profile = service.create("runner").expect("create");
        let issued = service.lock(&profile.id).expect("lock");
        let (key_id, secret) = issued.key.split_once(':').expect("two-part key");
        assert_eq!(key_id.len(), KEY_ID_CHARS);
        assert_eq!(secret.len(), KEY_SECRET_CHARS);
        assert!(issued.profile.locked);
        assert_eq!(issued.profile.key_id.as_deref(), Some(key_id));
        // Metadata projections never carry the secret again.
        let fetched = service.get(&profile.id).expect("get");
        let encoded = serde_json::to_string(&fetched).expect("encode");
        assert!(!encoded.contains(secret));
    }

    #[test]
    fn lock_twice_reports_already_locked() {
        let (service, _store) = service();
        let profile = service.create("").expect("create");
        service.lock(&profile.id).expect("first lock");
        assert!(matches!(
            service.lock(&profile.id),
            Err(ProfileError::AlreadyLocked(_))
        ));
    }

    #[test]
    fn credential_references_freeze_on_lock() {
        let (service, store) = service();
        store
            .insert_credential("API_KEY", "", None, 1_000)
            .expect("credential");
        let profile = service.create("").expect("create");
        service
            .add_credentials(&profile.id, &["API_KEY".to_string()])
            .expect("attach while unlocked");
        service.lock(&profile.id).expect("lock");
        assert!(matches!(
            service.add_credentials(&profile.id, &["API_KEY".to_string()]),
            Err(ProfileError::Locked(_))
        ));
        assert!(matches!(
            service.remove_credentials(&profile.id, &["API_KEY".to_string()]),
            Err(ProfileError::Locked(_))
        ));
    }

    #[test]
    fn attaching_unknown_credential_fails() {
        let (service, _store) = service();
        let profile = service.create("").expect("create");
        assert!(matches!(
            service.add_credentials(&profile.id, &["MISSING".to_string()]),
            Err(ProfileError::UnknownCredential(_))
        ));
    }

    #[test]
    fn remove_silently_skips_unattached_names() {
        let (service, store) = service();
        store
            .insert_credential("API_KEY", "", None, 1_000)
            .expect("credential");
        let profile = service.create("").expect("create");
        let details = service
            .remove_credentials(&profile.id, &["API_KEY".to_string()])
            .expect("remove unattached");
        assert!(details.credentials.is_empty());
    }

    #[test]
    fn revoke_is_irreversible_and_blocks_updates() {
        let (service, _store) = service();
        let profile = service.create("").expect("create");
        service.revoke(&profile.id).expect("revoke");
        assert!(matches!(
            service.revoke(&profile.id),
            Err(ProfileError::AlreadyRevoked(_))
        ));
        assert!(matches!(
            service.update(
                &profile.id,
                Some("renamed"),
                ValuePatch::Unchanged,
                ValuePatch::Unchanged
            ),
            Err(ProfileError::Revoked(_))
        ));
        assert!(matches!(
            service.lock(&profile.id),
            Err(ProfileError::Revoked(_))
        ));
    }

    #[test]
    fn update_remains_allowed_while_locked() {
        let (service, _store) = service();
        let profile = service.create("").expect("create");
        service.lock(&profile.id).expect("lock");
        let updated = service
            .update(
                &profile.id,
                Some("rotated purpose"),
                ValuePatch::Set(9_999_999_999_999),
                ValuePatch::Unchanged,
            )
            .expect("update while locked");
        assert_eq!(updated.description, "rotated purpose");
        assert_eq!(updated.expires_at, Some(9_999_999_999_999));
    }

    #[test]
    fn regenerate_swaps_key_material() {
        let (service, _store) = service();
        let profile = service.create("").expect("create");
        let first = service.lock(&profile.id).expect("lock");
        let second = service.regenerate_key(&profile.id).expect("regenerate");
        assert_ne!(first.key, second.key);
        assert_ne!(first.profile.key_id, second.profile.key_id);
        // Credential references and identity survive the swap.
        assert_eq!(first.profile.id, second.profile.id);
    }

    #[test]
    fn regenerate_requires_locked_state() {
        let (service, _store) = service();
        let profile = service.create("").expect("create");
        assert!(matches!(
            service.regenerate_key(&profile.id),
            Err(ProfileError::NotLocked(_))
        ));
    }

    #[test]
    fn delete_honors_the_lifecycle_guard() {
        let (service, _store) = service();
        let unlocked = service.create("").expect("create");
        service.delete(&unlocked.id).expect("delete unlocked");

        let locked = service.create("").expect("create");
        service.lock(&locked.id).expect("lock");
        assert!(matches!(
            service.delete(&locked.id),
            Err(ProfileError::LockedActive(_))
        ));
        service.revoke(&locked.id).expect("revoke");
        service.delete(&locked.id).expect("delete revoked");
        assert!(matches!(
            service.get(&locked.id),
            Err(ProfileError::NotFound(_))
        ));
    }
}
