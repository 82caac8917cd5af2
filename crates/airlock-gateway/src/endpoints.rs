//! Route constants for the agent and operator surfaces.

pub(crate) const HEALTHZ_ENDPOINT: &str = "/healthz";

pub(crate) const CREDENTIALS_ENDPOINT: &str = "/credentials";
pub(crate) const CREDENTIAL_DETAIL_ENDPOINT: &str = "/credentials/{name}";
pub(crate) const PROFILES_ENDPOINT: &str = "/profiles";
pub(crate) const PROFILE_DETAIL_ENDPOINT: &str = "/profiles/{id}";
pub(crate) const PROFILE_CREDENTIALS_ENDPOINT: &str = "/profiles/{id}/credentials";
pub(crate) const EXECUTE_ENDPOINT: &str = "/execute";
pub(crate) const EXECUTION_DETAIL_ENDPOINT: &str = "/executions/{id}";
pub(crate) const EXECUTION_RESPOND_ENDPOINT: &str = "/executions/{id}/respond";

pub(crate) const ADMIN_CREDENTIALS_ENDPOINT: &str = "/api/admin/credentials";
pub(crate) const ADMIN_CREDENTIAL_DETAIL_ENDPOINT: &str = "/api/admin/credentials/{name}";
pub(crate) const ADMIN_PROFILE_DETAIL_ENDPOINT: &str = "/api/admin/profiles/{id}";
pub(crate) const ADMIN_PROFILE_LOCK_ENDPOINT: &str = "/api/admin/profiles/{id}/lock";
pub(crate) const ADMIN_PROFILE_REVOKE_ENDPOINT: &str = "/api/admin/profiles/{id}/revoke";
pub(crate) const ADMIN_PROFILE_REGENERATE_KEY_ENDPOINT: &str =
    "/api/admin/profiles/{id}/regenerate-key";

/// Canonical polling target returned by `POST /execute`.
pub fn execution_poll_url(execution_id: &str) -> String {
    format!("/executions/{execution_id}")
}
