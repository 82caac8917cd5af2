//! Operator-surface handlers under `/api/admin`. Every entry point runs the
//! admin guard first; the admin-session subsystem itself lives outside this
//! service.

use axum::body::Bytes;
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::error::ApiError;
use crate::state::{authorize_admin, parse_json_body, SharedState};
use crate::types::{
    AdminCredentialCreateRequest, AdminCredentialUpdateRequest, AdminProfileUpdateRequest,
};

pub(crate) async fn handle_admin_credential_create(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(error) = authorize_admin(&state, &headers) {
        return error.into_response();
    }
    let request: AdminCredentialCreateRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match state.credentials.create(
        &request.name,
        &request.description,
        request.value.as_deref(),
    ) {
        Ok(meta) => (StatusCode::CREATED, Json(meta)).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

/// Value write/update/clear. The three-valued body distinguishes "leave the
/// secret alone" (key absent) from "clear it" (explicit null).
pub(crate) async fn handle_admin_credential_update(
    State(state): State<SharedState>,
    headers: HeaderMap,
    AxumPath(name): AxumPath<String>,
    body: Bytes,
) -> Response {
    if let Err(error) = authorize_admin(&state, &headers) {
        return error.into_response();
    }
    let request: AdminCredentialUpdateRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match state
        .credentials
        .update(&name, request.description.as_deref(), request.value)
    {
        Ok(meta) => Json(meta).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_admin_credential_delete(
    State(state): State<SharedState>,
    headers: HeaderMap,
    AxumPath(name): AxumPath<String>,
) -> Response {
    if let Err(error) = authorize_admin(&state, &headers) {
        return error.into_response();
    }
    match state.credentials.delete(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_admin_profile_update(
    State(state): State<SharedState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Response {
    if let Err(error) = authorize_admin(&state, &headers) {
        return error.into_response();
    }
    let request: AdminProfileUpdateRequest = match parse_json_body(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    match state.profiles.update(
        &id,
        request.description.as_deref(),
        request.expires_at,
        request.network_allowlist,
    ) {
        Ok(profile) => Json(profile).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

/// UNLOCKED → LOCKED. The response carries the full `ark_ID:SECRET` string;
/// this is the only time it is ever transmitted.
pub(crate) async fn handle_admin_profile_lock(
    State(state): State<SharedState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Response {
    if let Err(error) = authorize_admin(&state, &headers) {
        return error.into_response();
    }
    match state.profiles.lock(&id) {
        Ok(issued) => Json(issued).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_admin_profile_revoke(
    State(state): State<SharedState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Response {
    if let Err(error) = authorize_admin(&state, &headers) {
        return error.into_response();
    }
    match state.profiles.revoke(&id) {
        Ok(profile) => Json(profile).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

/// LOCKED → LOCKED with fresh key material; returns a new full key string.
pub(crate) async fn handle_admin_profile_regenerate_key(
    State(state): State<SharedState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Response {
    if let Err(error) = authorize_admin(&state, &headers) {
        return error.into_response();
    }
    match state.profiles.regenerate_key(&id) {
        Ok(issued) => Json(issued).into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}

pub(crate) async fn handle_admin_profile_delete(
    State(state): State<SharedState>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Response {
    if let Err(error) = authorize_admin(&state, &headers) {
        return error.into_response();
    }
    match state.profiles.delete(&id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => ApiError::from(error).into_response(),
    }
}
