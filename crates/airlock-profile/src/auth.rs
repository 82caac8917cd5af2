//! Bearer authentication: key id → profile, with reason-coded failures.

use std::fmt;

use airlock_core::{current_unix_timestamp_ms, is_expired_unix_ms};
use airlock_crypto::CryptoError;
use airlock_store::{ProfileState, StoreError};
use thiserror::Error;

use crate::keys::is_well_formed_key_id;
use crate::ProfileService;

/// Why a bearer token failed to authenticate. Ordering of checks is fixed:
/// presence, shape, existence, lifecycle, expiry.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("bearer token is missing")]
    Missing,
    #[error("bearer token is malformed")]
    Malformed,
    #[error("key is not recognized")]
    NotFound,
    #[error("profile is not locked")]
    NotLocked,
    #[error("profile has been revoked")]
    Revoked,
    #[error("profile has expired")]
    Expired,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A successfully authenticated request identity. Holds the decrypted
/// profile secret for the duration of one request; `Debug` stays redacted.
#[derive(Clone)]
pub struct AuthenticatedProfile {
    pub profile_id: String,
    secret: String,
}

impl AuthenticatedProfile {
    /// The plaintext secret, for HMAC verification only.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for AuthenticatedProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedProfile")
            .field("profile_id", &self.profile_id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl ProfileService {
    /// Resolves a presented bearer token to an execution identity.
    ///
    /// Only a LOCKED, unexpired profile authenticates. A key id that no
    /// longer resolves (never issued, or rotated away by `regenerate_key`)
    /// is `NotFound`. Success stamps `last_used_at`.
    pub fn authenticate(&self, bearer: Option<&str>) -> Result<AuthenticatedProfile, AuthError> {
        let token = bearer.map(str::trim).filter(|value| !value.is_empty());
        let Some(key_id) = token else {
            return Err(AuthError::Missing);
        };
        if !is_well_formed_key_id(key_id) {
            tracing::debug!("rejected malformed bearer token");
            return Err(AuthError::Malformed);
        }
        let Some(row) = self.store().get_profile_by_key_id(key_id)? else {
            tracing::debug!(key_id, "rejected unknown key id");
            return Err(AuthError::NotFound);
        };
        match row.state() {
            ProfileState::Revoked => {
                tracing::info!(profile = %row.id, "rejected revoked profile");
                return Err(AuthError::Revoked);
            }
            ProfileState::Unlocked => {
                // Unreachable through key lookup, but the lifecycle rule is
                // enforced here too rather than assumed.
                return Err(AuthError::NotLocked);
            }
            ProfileState::Locked => {}
        }
        let now_unix_ms = current_unix_timestamp_ms();
        if is_expired_unix_ms(row.expires_at_unix_ms, now_unix_ms) {
            tracing::info!(profile = %row.id, "rejected expired profile");
            return Err(AuthError::Expired);
        }
        let Some(secret_enc) = row.key_secret_enc.as_deref() else {
            return Err(AuthError::NotLocked);
        };
        let secret = self.master_key().decrypt_str(secret_enc)?;
        self.store().touch_profile_last_used(&row.id, now_unix_ms)?;
        Ok(AuthenticatedProfile {
            profile_id: row.id,
            secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use airlock_core::ValuePatch;
    use airlock_crypto::MasterKey;
    use airlock_store::Store;
    use tempfile::tempdir;

    use super::AuthError;
    use crate::{sign_script, verify_script, ProfileService};

    fn service() -> ProfileService {
        let dir = tempdir().expect("tempdir");
        let master_key = MasterKey::load_or_create(&dir.path().join("master.key")).expect("key");
        let store = Arc::new(Store::open_in_memory().expect("store"));
        ProfileService::new(store, master_key)
    }

    #[test]
    fn locked_profile_key_authenticates_and_signs() {
        let service = service();
        let profile = service.create("runner").expect("create");
        let issued = service.lock(&profile.id).expect("lock");
        let (key_id, secret) = issued.key.split_once(':').expect("two-part key");

        let identity = service
            .authenticate(Some(key_id))
            .expect("authenticate issued key");
        assert_eq!(identity.profile_id, profile.id);

        let script = "print(settings.get(\"API_KEY\")); set_result(1+1)";
        let signature = sign_script(secret, script);
        assert!(verify_script(identity.secret(), script, &signature));
    }

    #[test]
    fn missing_and_malformed_tokens_are_distinguished() {
        let service = service();
        assert!(matches!(service.authenticate(None), Err(AuthError::Missing)));
        assert!(matches!(
            service.authenticate(Some("")),
            Err(AuthError::Missing)
        ));
        assert!(matches!(
            service.authenticate(Some("not-an-ark-key")),
            Err(AuthError::Malformed)
        ));
    }

    #[test]
    fn unknown_key_id_reports_not_found() {
        let service = service();
        assert!(matches!(
            service.authenticate(Some("ark_aaaaaaaaaaaaaaaaaaaaaaaa")),
            Err(AuthError::NotFound)
        ));
    }

    #[test]
    fn revoked_profile_stops_authenticating() {
        let service = service();
        let profile = service.create("").expect("create");
        let issued = service.lock(&profile.id).expect("lock");
        let key_id = issued.profile.key_id.clone().expect("key id");
        service.revoke(&profile.id).expect("revoke");
        assert!(matches!(
            service.authenticate(Some(&key_id)),
            Err(AuthError::Revoked)
        ));
    }

    #[test]
    fn expiry_is_strictly_in_the_future() {
        let service = service();
        let profile = service.create("").expect("create");
        let issued = service.lock(&profile.id).expect("lock");
        let key_id = issued.profile.key_id.clone().expect("key id");
        service
            .update(
                &profile.id,
                None,
                ValuePatch::Set(airlock_core::current_unix_timestamp_ms() - 1_000),
                ValuePatch::Unchanged,
            )
            .expect("expire in the past");
        assert!(matches!(
            service.authenticate(Some(&key_id)),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn regenerate_invalidates_the_old_key_id() {
        let service = service();
        let profile = service.create("").expect("create");
        let first = service.lock(&profile.id).expect("lock");
        let old_key_id = first.profile.key_id.clone().expect("key id");
        let second = service.regenerate_key(&profile.id).expect("regenerate");
        let new_key_id = second.profile.key_id.clone().expect("key id");

        assert!(matches!(
            service.authenticate(Some(&old_key_id)),
            Err(AuthError::NotFound)
        ));
        service
            .authenticate(Some(&new_key_id))
            .expect("new key authenticates");
    }

    #[test]
    fn successful_auth_stamps_last_used() {
        let service = service();
        let profile = service.create("").expect("create");
        let issued = service.lock(&profile.id).expect("lock");
        let key_id = issued.profile.key_id.clone().expect("key id");
        assert!(issued.profile.last_used_at.is_none());
        service.authenticate(Some(&key_id)).expect("authenticate");
        let refreshed = service.get(&profile.id).expect("get");
        assert!(refreshed.last_used_at.is_some());
    }
}
