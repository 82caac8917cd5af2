//! Profile lifecycle over the wire: revocation, expiry, key regeneration,
//! and the auth failure taxonomy.

mod common;

use common::{accepted_execution_id, spawn_server};
use serde_json::Value;

#[tokio::test]
async fn revoked_profile_is_rejected_with_401() {
    let server = spawn_server().await;
    let profile_id = server.create_profile("doomed").await;
    let (key_id, secret) = server.lock_profile(&profile_id).await;
    server.revoke_profile(&profile_id).await;

    let response = server.execute(&key_id, &secret, "set_result(1)", None).await;
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.expect("error body");
    assert_eq!(body["error"]["message"], "Profile has been revoked");
}

#[tokio::test]
async fn expired_profile_is_rejected_with_401() {
    let server = spawn_server().await;
    let profile_id = server.create_profile("stale").await;
    let (key_id, secret) = server.lock_profile(&profile_id).await;

    // Expire one second in the past; update stays legal while locked.
    let expired_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_millis() as u64
        - 1_000;
    let response = server
        .client
        .patch(server.url(&format!("/api/admin/profiles/{profile_id}")))
        .json(&serde_json::json!({ "expires_at": expired_at }))
        .send()
        .await
        .expect("patch expiry");
    assert_eq!(response.status(), 200);

    let response = server.execute(&key_id, &secret, "set_result(1)", None).await;
    assert_eq!(response.status(), 401);
    let body: Value = response.json().await.expect("error body");
    assert_eq!(body["error"]["message"], "Profile has expired");
}

#[tokio::test]
async fn unknown_and_malformed_keys_are_rejected_with_401() {
    let server = spawn_server().await;

    let response = server
        .execute("ark_aaaaaaaaaaaaaaaaaaaaaaaa", "s", "set_result(1)", None)
        .await;
    assert_eq!(response.status(), 401);

    let response = server
        .execute("not-an-airlock-key", "s", "set_result(1)", None)
        .await;
    assert_eq!(response.status(), 401);

    let response = server
        .client
        .post(server.url("/execute"))
        .json(&serde_json::json!({ "script": "set_result(1)", "hash": "0" }))
        .send()
        .await
        .expect("execute without bearer");
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn regenerated_key_replaces_the_old_one() {
    let server = spawn_server().await;
    let profile_id = server.create_profile("rotating").await;
    let (old_key_id, old_secret) = server.lock_profile(&profile_id).await;

    let response = server
        .client
        .post(server.url(&format!(
            "/api/admin/profiles/{profile_id}/regenerate-key"
        )))
        .send()
        .await
        .expect("regenerate");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("regenerate body");
    let key = body["key"].as_str().expect("new full key");
    let (new_key_id, new_secret) = key.split_once(':').expect("two-part key");
    assert_ne!(new_key_id, old_key_id);

    // Old key id no longer authenticates.
    let response = server
        .execute(&old_key_id, &old_secret, "set_result(1)", None)
        .await;
    assert_eq!(response.status(), 401);

    // New key id runs to completion.
    let response = server
        .execute(new_key_id, new_secret, "set_result(1)", None)
        .await;
    let execution_id = accepted_execution_id(response).await;
    let done = server.poll_until_terminal(&execution_id).await;
    assert_eq!(done["status"], "completed");
}

#[tokio::test]
async fn lifecycle_conflicts_map_to_409() {
    let server = spawn_server().await;
    let profile_id = server.create_profile("conflicted").await;
    server.lock_profile(&profile_id).await;

    // Second lock.
    let response = server
        .client
        .post(server.url(&format!("/api/admin/profiles/{profile_id}/lock")))
        .send()
        .await
        .expect("second lock");
    assert_eq!(response.status(), 409);

    // Credential mutation while locked.
    let response = server
        .client
        .post(server.url(&format!("/profiles/{profile_id}/credentials")))
        .json(&serde_json::json!({ "credentials": ["ANY"] }))
        .send()
        .await
        .expect("attach while locked");
    assert_eq!(response.status(), 409);

    // Delete while locked and active.
    let response = server
        .client
        .delete(server.url(&format!("/api/admin/profiles/{profile_id}")))
        .send()
        .await
        .expect("delete locked");
    assert_eq!(response.status(), 409);

    server.revoke_profile(&profile_id).await;

    // Second revoke.
    let response = server
        .client
        .post(server.url(&format!("/api/admin/profiles/{profile_id}/revoke")))
        .send()
        .await
        .expect("second revoke");
    assert_eq!(response.status(), 409);

    // Regenerate after revoke.
    let response = server
        .client
        .post(server.url(&format!(
            "/api/admin/profiles/{profile_id}/regenerate-key"
        )))
        .send()
        .await
        .expect("regenerate revoked");
    assert_eq!(response.status(), 409);

    // Delete succeeds once revoked.
    let response = server
        .client
        .delete(server.url(&format!("/api/admin/profiles/{profile_id}")))
        .send()
        .await
        .expect("delete revoked");
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn profile_metadata_never_contains_the_secret() {
    let server = spawn_server().await;
    let profile_id = server.create_profile("quiet").await;
    let (_key_id, secret) = server.lock_profile(&profile_id).await;

    for path in [
        format!("/profiles/{profile_id}"),
        "/profiles".to_string(),
    ] {
        let body = server
            .client
            .get(server.url(&path))
            .send()
            .await
            .expect("get")
            .text()
            .await
            .expect("body");
        assert!(!body.contains(&secret), "secret leaked via {path}");
    }
}
