//! End-to-end execution scenarios: the happy path, integrity rejection, and
//! the llm pause/respond cycle.

mod common;

use common::{accepted_execution_id, spawn_server};
use serde_json::Value;

#[tokio::test]
async fn credentialed_script_completes_with_redacted_output() {
    let server = spawn_server().await;
    server
        .create_credential("API_KEY", "k", Some("sk-live-abc1234"))
        .await;
    let profile_id = server.create_profile("r").await;
    server.attach_credentials(&profile_id, &["API_KEY"]).await;
    let (key_id, secret) = server.lock_profile(&profile_id).await;
    assert_eq!(key_id.len(), 28);
    assert!(key_id.starts_with("ark_"));
    assert_eq!(secret.len(), 48);

    let script = r#"print(settings.get("API_KEY")); set_result(1+1)"#;
    let response = server.execute(&key_id, &secret, script, None).await;
    let execution_id = accepted_execution_id(response).await;

    let done = server.poll_until_terminal(&execution_id).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["result"], 2);
    assert_eq!(done["stdout"], "[REDACTED...1234]\n");

    // The plaintext value must not appear anywhere in the response body.
    let rendered = done.to_string();
    assert!(!rendered.contains("sk-live-abc1234"));
}

#[tokio::test]
async fn wrong_hash_is_rejected_with_403() {
    let server = spawn_server().await;
    server.create_credential("API_KEY", "k", Some("v")).await;
    let profile_id = server.create_profile("r").await;
    server.attach_credentials(&profile_id, &["API_KEY"]).await;
    let (key_id, _secret) = server.lock_profile(&profile_id).await;

    let zeros = "0".repeat(64);
    let response = server
        .execute_with_hash(&key_id, "set_result(1)", &zeros, None)
        .await;
    assert_eq!(response.status(), 403);

    // Malformed digests fail the same way: the key was valid, the code was
    // not.
    let response = server
        .execute_with_hash(&key_id, "set_result(1)", "not-a-digest", None)
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn llm_pause_surfaces_request_and_resumes_on_respond() {
    let server = spawn_server().await;
    let profile_id = server.create_profile("pauser").await;
    let (key_id, secret) = server.lock_profile(&profile_id).await;

    let script = r#"x = llm.complete("p"); set_result(x)"#;
    let response = server.execute(&key_id, &secret, script, None).await;
    let execution_id = accepted_execution_id(response).await;

    let waiting = server
        .poll_until(&execution_id, |body| body["status"] == "awaiting_llm")
        .await;
    assert_eq!(waiting["llm_request"]["prompt"], "p");
    assert_eq!(waiting["llm_request"]["model"], "default");

    let response = server
        .client
        .post(server.url(&format!("/executions/{execution_id}/respond")))
        .json(&serde_json::json!({ "response": "R" }))
        .send()
        .await
        .expect("respond");
    assert_eq!(response.status(), 200);
    let resumed: Value = response.json().await.expect("respond body");
    assert_eq!(resumed["status"], "running");

    let done = server.poll_until_terminal(&execution_id).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["result"], "R");

    // A second respond hits a record that is no longer awaiting.
    let late = server
        .client
        .post(server.url(&format!("/executions/{execution_id}/respond")))
        .json(&serde_json::json!({ "response": "again" }))
        .send()
        .await
        .expect("late respond");
    assert_eq!(late.status(), 409);
}

#[tokio::test]
async fn script_errors_become_execution_status_not_http_errors() {
    let server = spawn_server().await;
    let profile_id = server.create_profile("failing").await;
    let (key_id, secret) = server.lock_profile(&profile_id).await;

    let response = server
        .execute(&key_id, &secret, "set_result(1/0)", None)
        .await;
    let execution_id = accepted_execution_id(response).await;

    let done = server.poll_until_terminal(&execution_id).await;
    assert_eq!(done["status"], "error");
    assert!(done["error"]
        .as_str()
        .expect("error message")
        .contains("division by zero"));
}

#[tokio::test]
async fn healthz_reports_worker_slot_accounting() {
    let server = spawn_server().await;
    let body: Value = server
        .client
        .get(server.url("/healthz"))
        .send()
        .await
        .expect("healthz")
        .json()
        .await
        .expect("health body");
    assert_eq!(body["status"], "ok");
    let workers = body["workers"].as_array().expect("slot table").len();
    assert_eq!(body["idle_workers"], workers as u64);
}

#[tokio::test]
async fn unknown_execution_polls_as_404() {
    let server = spawn_server().await;
    let response = server
        .client
        .get(server.url("/executions/exec_missing"))
        .send()
        .await
        .expect("poll");
    assert_eq!(response.status(), 404);
}
