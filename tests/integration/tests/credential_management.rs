//! Credential slot management over the wire: discovery, validation, value
//! handling, and the locked-profile delete guard.

mod common;

use common::spawn_server;
use serde_json::Value;

#[tokio::test]
async fn agent_bulk_create_reports_created_and_skipped() {
    let server = spawn_server().await;
    server.create_credential("EXISTING", "seeded", None).await;

    let response = server
        .client
        .post(server.url("/credentials"))
        .json(&serde_json::json!({
            "credentials": [
                { "name": "EXISTING", "description": "dupe" },
                { "name": "FRESH_KEY", "description": "new slot" },
            ]
        }))
        .send()
        .await
        .expect("bulk create");
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["created"], serde_json::json!(["FRESH_KEY"]));
    assert_eq!(body["skipped"], serde_json::json!(["EXISTING"]));
}

#[tokio::test]
async fn invalid_names_reject_the_whole_batch_with_422() {
    let server = spawn_server().await;
    let long_name = "a".repeat(129);
    for bad in ["", "123bad", "has space", long_name.as_str()] {
        let response = server
            .client
            .post(server.url("/credentials"))
            .json(&serde_json::json!({
                "credentials": [
                    { "name": "WOULD_BE_FINE" },
                    { "name": bad },
                ]
            }))
            .send()
            .await
            .expect("bulk create");
        assert_eq!(response.status(), 422, "name {bad:?} must reject");
    }
    // Nothing from the failed batches was written.
    let listing: Value = server
        .client
        .get(server.url("/credentials"))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("list body");
    assert_eq!(listing["credentials"], serde_json::json!([]));
}

#[tokio::test]
async fn listing_exposes_value_presence_but_never_values() {
    let server = spawn_server().await;
    server
        .create_credential("WITH_VALUE", "set", Some("super-secret-value"))
        .await;
    server.create_credential("EMPTY_SLOT", "unset", None).await;

    let response = server
        .client
        .get(server.url("/credentials"))
        .send()
        .await
        .expect("list");
    assert_eq!(response.status(), 200);
    let raw = response.text().await.expect("raw body");
    assert!(!raw.contains("super-secret-value"));

    let body: Value = serde_json::from_str(&raw).expect("parse");
    let credentials = body["credentials"].as_array().expect("array");
    let by_name = |name: &str| {
        credentials
            .iter()
            .find(|entry| entry["name"] == name)
            .unwrap_or_else(|| panic!("missing {name}"))
    };
    assert_eq!(by_name("WITH_VALUE")["value_exists"], true);
    assert_eq!(by_name("EMPTY_SLOT")["value_exists"], false);
}

#[tokio::test]
async fn admin_value_update_clear_and_not_found() {
    let server = spawn_server().await;
    server.create_credential("ROTATING", "", Some("first")).await;

    // Replace the value.
    let response = server
        .client
        .put(server.url("/api/admin/credentials/ROTATING"))
        .json(&serde_json::json!({ "value": "second" }))
        .send()
        .await
        .expect("update");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["value_exists"], true);

    // Explicit null clears the stored secret.
    let response = server
        .client
        .put(server.url("/api/admin/credentials/ROTATING"))
        .json(&serde_json::json!({ "value": null }))
        .send()
        .await
        .expect("clear");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["value_exists"], false);

    // A body without the value key leaves the secret untouched.
    let response = server
        .client
        .put(server.url("/api/admin/credentials/ROTATING"))
        .json(&serde_json::json!({ "description": "renamed" }))
        .send()
        .await
        .expect("describe");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("body");
    assert_eq!(body["description"], "renamed");
    assert_eq!(body["value_exists"], false);

    let response = server
        .client
        .put(server.url("/api/admin/credentials/MISSING"))
        .json(&serde_json::json!({ "value": "x" }))
        .send()
        .await
        .expect("update missing");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn delete_blocked_by_locked_profile_then_allowed_after_revoke() {
    let server = spawn_server().await;
    server.create_credential("K", "guarded", Some("v")).await;

    let unlocked_profile = server.create_profile("p1").await;
    server.attach_credentials(&unlocked_profile, &["K"]).await;

    let locked_profile = server.create_profile("p2").await;
    server.attach_credentials(&locked_profile, &["K"]).await;
    server.lock_profile(&locked_profile).await;

    // Blocked: the 409 names the locked profile that holds the reference.
    let response = server
        .client
        .delete(server.url("/credentials/K"))
        .send()
        .await
        .expect("blocked delete");
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.expect("body");
    assert!(body["error"]["message"]
        .as_str()
        .expect("message")
        .contains(&locked_profile));

    server.revoke_profile(&locked_profile).await;

    let response = server
        .client
        .delete(server.url("/credentials/K"))
        .send()
        .await
        .expect("delete after revoke");
    assert_eq!(response.status(), 204);

    // The unlocked profile lost its binding silently.
    let profile: Value = server
        .client
        .get(server.url(&format!("/profiles/{unlocked_profile}")))
        .send()
        .await
        .expect("profile get")
        .json()
        .await
        .expect("profile body");
    assert_eq!(profile["credentials"], serde_json::json!([]));

    let response = server
        .client
        .delete(server.url("/credentials/K"))
        .send()
        .await
        .expect("delete missing");
    assert_eq!(response.status(), 404);
}
