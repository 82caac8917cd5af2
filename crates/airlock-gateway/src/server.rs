//! Router wiring and server bootstrap.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use tokio::net::TcpListener;

use crate::admin_handlers::{
    handle_admin_credential_create, handle_admin_credential_delete,
    handle_admin_credential_update, handle_admin_profile_delete, handle_admin_profile_lock,
    handle_admin_profile_regenerate_key, handle_admin_profile_revoke, handle_admin_profile_update,
};
use crate::agent_handlers::{
    handle_credential_delete, handle_credentials_create, handle_credentials_list,
    handle_execute, handle_execution_get, handle_execution_respond, handle_healthz,
    handle_profile_create, handle_profile_credentials_add, handle_profile_credentials_remove,
    handle_profile_get, handle_profiles_list,
};
use crate::endpoints::{
    ADMIN_CREDENTIALS_ENDPOINT, ADMIN_CREDENTIAL_DETAIL_ENDPOINT, ADMIN_PROFILE_DETAIL_ENDPOINT,
    ADMIN_PROFILE_LOCK_ENDPOINT, ADMIN_PROFILE_REGENERATE_KEY_ENDPOINT,
    ADMIN_PROFILE_REVOKE_ENDPOINT, CREDENTIALS_ENDPOINT, CREDENTIAL_DETAIL_ENDPOINT,
    EXECUTE_ENDPOINT, EXECUTION_DETAIL_ENDPOINT, EXECUTION_RESPOND_ENDPOINT, HEALTHZ_ENDPOINT,
    PROFILES_ENDPOINT, PROFILE_CREDENTIALS_ENDPOINT, PROFILE_DETAIL_ENDPOINT,
};
use crate::state::GatewayState;

pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route(HEALTHZ_ENDPOINT, get(handle_healthz))
        .route(
            CREDENTIALS_ENDPOINT,
            get(handle_credentials_list).post(handle_credentials_create),
        )
        .route(CREDENTIAL_DETAIL_ENDPOINT, delete(handle_credential_delete))
        .route(
            PROFILES_ENDPOINT,
            get(handle_profiles_list).post(handle_profile_create),
        )
        .route(PROFILE_DETAIL_ENDPOINT, get(handle_profile_get))
        .route(
            PROFILE_CREDENTIALS_ENDPOINT,
            post(handle_profile_credentials_add).delete(handle_profile_credentials_remove),
        )
        .route(EXECUTE_ENDPOINT, post(handle_execute))
        .route(EXECUTION_DETAIL_ENDPOINT, get(handle_execution_get))
        .route(EXECUTION_RESPOND_ENDPOINT, post(handle_execution_respond))
        .route(
            ADMIN_CREDENTIALS_ENDPOINT,
            post(handle_admin_credential_create),
        )
        .route(
            ADMIN_CREDENTIAL_DETAIL_ENDPOINT,
            put(handle_admin_credential_update).delete(handle_admin_credential_delete),
        )
        .route(
            ADMIN_PROFILE_DETAIL_ENDPOINT,
            patch(handle_admin_profile_update).delete(handle_admin_profile_delete),
        )
        .route(ADMIN_PROFILE_LOCK_ENDPOINT, post(handle_admin_profile_lock))
        .route(
            ADMIN_PROFILE_REVOKE_ENDPOINT,
            post(handle_admin_profile_revoke),
        )
        .route(
            ADMIN_PROFILE_REGENERATE_KEY_ENDPOINT,
            post(handle_admin_profile_regenerate_key),
        )
        .with_state(state)
}

/// Binds and serves until ctrl-c. Returns the error that stopped the server.
pub async fn run_server(state: Arc<GatewayState>, bind: &str) -> Result<()> {
    let bind_addr = bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address '{bind}'"))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    tracing::info!(addr = %local_addr, "airlock gateway listening");

    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("gateway server exited unexpectedly")
}
