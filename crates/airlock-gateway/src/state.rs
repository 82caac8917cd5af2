//! Shared gateway state and request preflight helpers.

use std::sync::Arc;
use std::time::Duration;

use airlock_credential::CredentialService;
use airlock_dispatch::Dispatcher;
use airlock_profile::ProfileService;
use axum::body::Bytes;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// How the operator surface is guarded. The full admin-session subsystem
/// lives outside this service; the gateway only carries the check.
#[derive(Debug, Clone)]
pub enum AdminAuthMode {
    /// No token configured: operator endpoints are open for local
    /// development deployments.
    LocalhostDev,
    /// Require `Authorization: Bearer <token>` on every operator call.
    Token(String),
}

/// Everything the handlers share. Cheap to clone behind the router's `Arc`.
pub struct GatewayState {
    pub credentials: CredentialService,
    pub profiles: ProfileService,
    pub dispatcher: Dispatcher,
    pub admin_auth: AdminAuthMode,
}

pub(crate) type SharedState = Arc<GatewayState>;

pub(crate) fn bearer_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?;
    let raw = header.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

/// Parses a JSON body, mapping malformed input to a stable 422.
pub(crate) fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|error| ApiError::unprocessable("invalid_body", format!("invalid body: {error}")))
}

/// Guards an operator endpoint according to the configured mode.
pub(crate) fn authorize_admin(state: &GatewayState, headers: &HeaderMap) -> Result<(), ApiError> {
    match &state.admin_auth {
        AdminAuthMode::LocalhostDev => Ok(()),
        AdminAuthMode::Token(expected) => {
            let Some(observed) = bearer_token_from_headers(headers) else {
                return Err(ApiError::unauthorized(
                    "missing_token",
                    "Authorization bearer token is missing",
                ));
            };
            if observed != *expected {
                return Err(ApiError::unauthorized(
                    "invalid_admin_token",
                    "Invalid admin token",
                ));
            }
            Ok(())
        }
    }
}

/// Converts the execute body's timeout (seconds) to the dispatcher's input.
pub(crate) fn script_timeout(seconds: Option<u64>) -> Option<Duration> {
    seconds.map(Duration::from_secs)
}
