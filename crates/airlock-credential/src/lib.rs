//! Credential-slot service: CRUD over named secret slots and profile-scoped
//! resolution to plaintext.
//!
//! Plaintext values exist in exactly two places: inside the operator's
//! set-value request and inside `resolve_for_profile`'s return value, which
//! the dispatcher injects into the sandbox and never echoes back. Every API
//! projection exposes `value_exists` only.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use airlock_core::{current_unix_timestamp_ms, ValuePatch};
use airlock_crypto::{CryptoError, MasterKey};
use airlock_store::{CredentialRow, ProfileState, Store, StoreError};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Upper bound on credential slot names.
pub const CREDENTIAL_NAME_MAX_CHARS: usize = 128;

/// Typed failures of the credential service.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential name '{0}' is invalid: must match ^[A-Za-z_][A-Za-z0-9_]*$ and be at most {CREDENTIAL_NAME_MAX_CHARS} characters")]
    InvalidName(String),
    #[error("credential '{0}' already exists")]
    NameTaken(String),
    #[error("credential '{0}' not found")]
    NotFound(String),
    #[error("credential '{name}' is referenced by locked profiles")]
    InUse {
        name: String,
        locked_profile_ids: Vec<String>,
    },
    #[error("profile '{0}' not found")]
    ProfileNotFound(String),
    #[error("profile '{0}' is not locked")]
    ProfileNotLocked(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything the API may see about a slot. Never the value.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialMeta {
    pub name: String,
    pub description: String,
    pub value_exists: bool,
    pub created_at: u64,
    pub updated_at: Option<u64>,
}

impl From<CredentialRow> for CredentialMeta {
    fn from(row: CredentialRow) -> Self {
        Self {
            value_exists: row.value_exists(),
            name: row.name,
            description: row.description,
            created_at: row.created_at_unix_ms,
            updated_at: row.updated_at_unix_ms,
        }
    }
}

fn credential_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("hard-coded pattern compiles")
    })
}

/// Validates a slot name against the naming rule.
pub fn validate_credential_name(name: &str) -> Result<(), CredentialError> {
    if name.is_empty()
        || name.chars().count() > CREDENTIAL_NAME_MAX_CHARS
        || !credential_name_pattern().is_match(name)
    {
        return Err(CredentialError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Service over the credential table. Cheap to clone.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<Store>,
    master_key: MasterKey,
}

impl CredentialService {
    pub fn new(store: Arc<Store>, master_key: MasterKey) -> Self {
        Self { store, master_key }
    }

    pub fn list(&self) -> Result<Vec<CredentialMeta>, CredentialError> {
        let rows = self.store.list_credentials()?;
        Ok(rows.into_iter().map(CredentialMeta::from).collect())
    }

    pub fn get(&self, name: &str) -> Result<Option<CredentialMeta>, CredentialError> {
        Ok(self.store.get_credential(name)?.map(CredentialMeta::from))
    }

    /// Creates a slot; agents pass no value, operators may seed one.
    pub fn create(
        &self,
        name: &str,
        description: &str,
        value: Option<&str>,
    ) -> Result<CredentialMeta, CredentialError> {
        validate_credential_name(name)?;
        let value_enc = value
            .map(|plaintext| self.master_key.encrypt_str(plaintext))
            .transpose()?;
        let row = self
            .store
            .insert_credential(
                name,
                description,
                value_enc.as_deref(),
                current_unix_timestamp_ms(),
            )
            .map_err(|error| match error {
                StoreError::NameTaken => CredentialError::NameTaken(name.to_string()),
                other => CredentialError::Store(other),
            })?;
        tracing::info!(credential = name, value_seeded = value.is_some(), "credential created");
        Ok(row.into())
    }

    /// Partial update. `ValuePatch::Clear` drops the stored secret;
    /// `Unchanged` leaves it alone.
    pub fn update(
        &self,
        name: &str,
        description: Option<&str>,
        value: ValuePatch<String>,
    ) -> Result<CredentialMeta, CredentialError> {
        let value_enc = match value {
            ValuePatch::Unchanged => ValuePatch::Unchanged,
            ValuePatch::Clear => ValuePatch::Clear,
            ValuePatch::Set(plaintext) => {
                ValuePatch::Set(self.master_key.encrypt_str(&plaintext)?)
            }
        };
        let value_changed = !value_enc.is_unchanged();
        let row = self
            .store
            .update_credential(name, description, value_enc, current_unix_timestamp_ms())
            .map_err(|error| match error {
                StoreError::NotFound => CredentialError::NotFound(name.to_string()),
                other => CredentialError::Store(other),
            })?;
        tracing::info!(credential = name, value_changed, "credential updated");
        Ok(row.into())
    }

    /// Deletes a slot unless a locked (and not revoked) profile still
    /// references it. References from unlocked or revoked profiles are
    /// dropped silently.
    pub fn delete(&self, name: &str) -> Result<(), CredentialError> {
        let row = self
            .store
            .get_credential(name)?
            .ok_or_else(|| CredentialError::NotFound(name.to_string()))?;
        let locked_profile_ids = self.store.locked_profiles_referencing(row.id)?;
        if !locked_profile_ids.is_empty() {
            return Err(CredentialError::InUse {
                name: name.to_string(),
                locked_profile_ids,
            });
        }
        self.store.delete_credential_with_bindings(row.id)?;
        tracing::info!(credential = name, "credential deleted");
        Ok(())
    }

    /// Decrypts every bound slot with a set value for a LOCKED profile.
    /// The returned map is the only plaintext surface of this service; it
    /// must stay inside the execution request's scope.
    pub fn resolve_for_profile(
        &self,
        profile_id: &str,
    ) -> Result<BTreeMap<String, String>, CredentialError> {
        let profile = self
            .store
            .get_profile(profile_id)?
            .ok_or_else(|| CredentialError::ProfileNotFound(profile_id.to_string()))?;
        if profile.state() != ProfileState::Locked {
            return Err(CredentialError::ProfileNotLocked(profile_id.to_string()));
        }
        let mut resolved = BTreeMap::new();
        for row in self.store.list_profile_credentials(profile_id)? {
            let Some(blob) = row.value_enc.as_deref() else {
                continue;
            };
            let plaintext = self.master_key.decrypt_str(blob)?;
            resolved.insert(row.name, plaintext);
        }
        tracing::debug!(
            profile = profile_id,
            resolved = resolved.len(),
            "resolved credentials for execution"
        );
        Ok(resolved)
    }
}
