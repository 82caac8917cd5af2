//! Request/response bodies crossing the HTTP boundary.

use airlock_core::patch::{deserialize_patch, ValuePatch};
use airlock_credential::CredentialMeta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct CredentialsListResponse {
    pub(crate) credentials: Vec<CredentialMeta>,
}

/// Agent-side bulk create: names and descriptions only, never values.
#[derive(Debug, Deserialize)]
pub(crate) struct AgentCredentialsCreateRequest {
    pub(crate) credentials: Vec<AgentCredentialSpec>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AgentCredentialSpec {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AgentCredentialsCreateResponse {
    pub(crate) created: Vec<String>,
    pub(crate) skipped: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileCreateRequest {
    #[serde(default)]
    pub(crate) description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileCredentialsRequest {
    pub(crate) credentials: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExecuteRequest {
    pub(crate) script: String,
    pub(crate) hash: String,
    /// Script wall-clock budget in seconds; server default when absent.
    pub(crate) timeout: Option<u64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExecuteAcceptedResponse {
    pub(crate) execution_id: String,
    pub(crate) poll_url: String,
    pub(crate) status: &'static str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LlmRespondRequest {
    pub(crate) response: String,
}

/// Operator-side create: may seed a value.
#[derive(Debug, Deserialize)]
pub(crate) struct AdminCredentialCreateRequest {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: String,
    pub(crate) value: Option<String>,
}

/// Operator-side update. A missing `value` key leaves the secret alone; an
/// explicit `null` clears it.
#[derive(Debug, Deserialize)]
pub(crate) struct AdminCredentialUpdateRequest {
    pub(crate) description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_patch")]
    pub(crate) value: ValuePatch<String>,
}

/// Operator-side profile patch; every field is optional and `null` clears
/// the nullable ones.
#[derive(Debug, Deserialize)]
pub(crate) struct AdminProfileUpdateRequest {
    pub(crate) description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_patch")]
    pub(crate) expires_at: ValuePatch<u64>,
    #[serde(default, deserialize_with = "deserialize_patch")]
    pub(crate) network_allowlist: ValuePatch<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) idle_workers: usize,
    pub(crate) workers: Vec<airlock_dispatch::SlotStatus>,
}
