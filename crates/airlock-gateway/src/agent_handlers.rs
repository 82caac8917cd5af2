//! Agent-surface handlers: credential discovery, profile assembly up to
//! lock, execute, and the polling endpoints.

use airlock_credential::validate_credential_name;
use airlock_dispatch::ExecutionRequest;
use airlock_profile::verify_script;
use axum::body::Bytes;
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::endpoints::execution_poll_url;
use crate::error::ApiError;
use crate::state::{bearer_token_from_headers, parse_json_body, script_timeout, SharedState};
use crate::types::{
    AgentCredentialsCreateRequest, AgentCredentialsCreateResponse, CredentialsListResponse,
    ExecuteAcceptedResponse, ExecuteRequest, HealthResponse, LlmRespondRequest,
    ProfileCreateRequest, ProfileCredentialsRequest,
};

pub(crate) async fn handle_healthz(State(state): State<SharedState>) -> Response {
    Json(HealthResponse {
        status: "ok",
        idle_workers: state.dispatcher.idle_workers(),
        workers: state.dispatcher.pool_snapshot(),
    })
    .into_response()
}

pub(crate) async fn handle_credentials_list(State(state): State<SharedState>) -> Response {
    match state.credentials.list() {
        Ok(credentials) => Json(CredentialsListResponse { credentials }).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

/// Bulk discovery registration: names that already exist are skipped so
/// agent retries stay idempotent. Any invalid name rejects the whole batch
/// before a single row is written.
pub(crate) async fn handle_credentials_create(
    State(state): State<SharedState>,
    body: Bytes,
) -> Response {
    let request: AgentCredentialsCreateRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    for spec in &request.credentials {
        if let Err(error) = validate_credential_name(&spec.name) {
            return ApiError::from(error).into_response();
        }
    }
    let mut created = Vec::new();
    let mut skipped = Vec::new();
    for spec in request.credentials {
        match state.credentials.get(&spec.name) {
            Ok(Some(_)) => {
                skipped.push(spec.name);
                continue;
            }
            Ok(None) => {}
            Err(error) => return ApiError::from(error).into_response(),
        }
        match state.credentials.create(&spec.name, &spec.description, None) {
            Ok(_) => created.push(spec.name),
            Err(airlock_credential::CredentialError::NameTaken(name)) => skipped.push(name),
            Err(error) => return ApiError::from(error).into_response(),
        }
    }
    (
        StatusCode::CREATED,
        Json(AgentCredentialsCreateResponse { created, skipped }),
    )
        .into_response()
}

pub(crate) async fn handle_credential_delete(
    State(state): State<SharedState>,
    AxumPath(name): AxumPath<String>,
) -> Response {
    match state.credentials.delete(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_profiles_list(State(state): State<SharedState>) -> Response {
    match state.profiles.list() {
        Ok(profiles) => Json(serde_json::json!({ "profiles": profiles })).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_profile_get(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    match state.profiles.get(&id) {
        Ok(profile) => Json(profile).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_profile_create(
    State(state): State<SharedState>,
    body: Bytes,
) -> Response {
    let request: ProfileCreateRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match state.profiles.create(&request.description) {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_profile_credentials_add(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Response {
    let request: ProfileCredentialsRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match state.profiles.add_credentials(&id, &request.credentials) {
        Ok(profile) => Json(profile).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_profile_credentials_remove(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Response {
    let request: ProfileCredentialsRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match state.profiles.remove_credentials(&id, &request.credentials) {
        Ok(profile) => Json(profile).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

/// The authenticated execution ingress. Auth, integrity, and resolution all
/// complete before the dispatcher sees the request; the resolved plaintext
/// map never outlives this function's scope.
pub(crate) async fn handle_execute(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let bearer = bearer_token_from_headers(&headers);
    let identity = match state.profiles.authenticate(bearer.as_deref()) {
        Ok(identity) => identity,
        Err(error) => return ApiError::from(error).into_response(),
    };

    let request: ExecuteRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    if !verify_script(identity.secret(), &request.script, &request.hash) {
        tracing::warn!(profile = %identity.profile_id, "script hash verification failed");
        return ApiError::forbidden("Script hash verification failed").into_response();
    }

    let credentials = match state.credentials.resolve_for_profile(&identity.profile_id) {
        Ok(credentials) => credentials,
        Err(error) => return ApiError::from(error).into_response(),
    };
    let network_allowlist = match state.profiles.get(&identity.profile_id) {
        Ok(profile) => profile.network_allowlist,
        Err(error) => return ApiError::from(error).into_response(),
    };

    let accepted = match state.dispatcher.submit(ExecutionRequest {
        profile_id: identity.profile_id,
        script: request.script,
        credentials,
        network_allowlist,
        timeout: script_timeout(request.timeout),
    }) {
        Ok(snapshot) => snapshot,
        Err(error) => return ApiError::from(error).into_response(),
    };

    (
        StatusCode::ACCEPTED,
        Json(ExecuteAcceptedResponse {
            poll_url: execution_poll_url(&accepted.execution_id),
            execution_id: accepted.execution_id,
            status: "pending",
        }),
    )
        .into_response()
}

pub(crate) async fn handle_execution_get(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    match state.dispatcher.poll(&id) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_execution_respond(
    State(state): State<SharedState>,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Response {
    let request: LlmRespondRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match state.dispatcher.respond(&id, request.response) {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}
