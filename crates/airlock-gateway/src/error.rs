//! Gateway error envelope and the service-error → HTTP status mapping.
//!
//! Service layers raise typed errors; this module is the single place they
//! become wire responses. Agent-visible messages never carry secret
//! material; integrity failures stay opaque and the detail goes to the log.

use airlock_credential::CredentialError;
use airlock_dispatch::DispatchError;
use airlock_profile::{AuthError, ProfileError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, code, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "script_hash_mismatch", message)
    }

    pub fn unprocessable(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, code, message)
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "internal error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": {
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Missing => {
                Self::unauthorized("missing_token", "Authorization bearer token is missing")
            }
            AuthError::Malformed | AuthError::NotFound => {
                Self::unauthorized("invalid_key", "Invalid API key")
            }
            AuthError::NotLocked => {
                Self::unauthorized("profile_not_locked", "Profile is not locked")
            }
            AuthError::Revoked => {
                Self::unauthorized("profile_revoked", "Profile has been revoked")
            }
            AuthError::Expired => {
                Self::unauthorized("profile_expired", "Profile has expired")
            }
            AuthError::Crypto(inner) => {
                tracing::error!(error = %inner, "credential decryption failed during auth");
                Self::internal()
            }
            AuthError::Store(inner) => {
                tracing::error!(error = %inner, "store failure during auth");
                Self::internal()
            }
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(error: CredentialError) -> Self {
        match error {
            CredentialError::InvalidName(_) => {
                Self::unprocessable("invalid_credential_name", error.to_string())
            }
            CredentialError::NameTaken(_) => Self::conflict("credential_exists", error.to_string()),
            CredentialError::NotFound(_) | CredentialError::ProfileNotFound(_) => {
                Self::not_found(error.to_string())
            }
            CredentialError::InUse {
                ref name,
                ref locked_profile_ids,
            } => Self::conflict(
                "credential_in_use",
                format!(
                    "credential '{name}' is referenced by locked profiles: {}",
                    locked_profile_ids.join(", ")
                ),
            ),
            CredentialError::ProfileNotLocked(_) => {
                Self::conflict("profile_not_locked", error.to_string())
            }
            CredentialError::Crypto(inner) => {
                tracing::error!(error = %inner, "stored credential failed decryption");
                Self::internal()
            }
            CredentialError::Store(inner) => {
                tracing::error!(error = %inner, "store failure in credential service");
                Self::internal()
            }
        }
    }
}

impl From<ProfileError> for ApiError {
    fn from(error: ProfileError) -> Self {
        match error {
            ProfileError::NotFound(_) | ProfileError::UnknownCredential(_) => {
                Self::not_found(error.to_string())
            }
            ProfileError::Locked(_) => Self::conflict("profile_locked", error.to_string()),
            ProfileError::AlreadyLocked(_) => {
                Self::conflict("profile_already_locked", error.to_string())
            }
            ProfileError::NotLocked(_) => Self::conflict("profile_not_locked", error.to_string()),
            ProfileError::Revoked(_) => Self::conflict("profile_revoked", error.to_string()),
            ProfileError::AlreadyRevoked(_) => {
                Self::conflict("profile_already_revoked", error.to_string())
            }
            ProfileError::LockedActive(_) => {
                Self::conflict("profile_locked_active", error.to_string())
            }
            ProfileError::Crypto(inner) => {
                tracing::error!(error = %inner, "profile secret failed decryption");
                Self::internal()
            }
            ProfileError::Store(inner) => {
                tracing::error!(error = %inner, "store failure in profile service");
                Self::internal()
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::NotFound(_) => Self::not_found(error.to_string()),
            DispatchError::WrongState { .. } => {
                Self::conflict("not_awaiting_llm", error.to_string())
            }
            DispatchError::Saturated => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "saturated",
                "execution queue is saturated; retry later",
            ),
            DispatchError::Store(inner) => {
                tracing::error!(error = %inner, "store failure in dispatcher");
                Self::internal()
            }
        }
    }
}
