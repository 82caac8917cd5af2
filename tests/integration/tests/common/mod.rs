//! Shared harness: boots a full Airlock instance on an ephemeral port and
//! drives it over HTTP the way an agent or operator would.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use airlock_credential::CredentialService;
use airlock_crypto::MasterKey;
use airlock_dispatch::{Dispatcher, DispatcherConfig};
use airlock_gateway::{build_router, AdminAuthMode, GatewayState};
use airlock_profile::ProfileService;
use airlock_sandbox::ScriptSandbox;
use airlock_store::Store;
use serde_json::Value;
use tempfile::TempDir;

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    // Held so the data directory outlives the server.
    _data_dir: TempDir,
}

pub async fn spawn_server() -> TestServer {
    spawn_server_with(DispatcherConfig::default()).await
}

pub async fn spawn_server_with(config: DispatcherConfig) -> TestServer {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let master_key =
        MasterKey::load_or_create(&data_dir.path().join("master.key")).expect("master key");
    let store = Arc::new(Store::open(&data_dir.path().join("airlock.db")).expect("store"));

    let state = Arc::new(GatewayState {
        credentials: CredentialService::new(store.clone(), master_key.clone()),
        profiles: ProfileService::new(store.clone(), master_key),
        dispatcher: Dispatcher::start(store, Arc::new(ScriptSandbox::new()), config)
            .expect("dispatcher"),
        admin_auth: AdminAuthMode::LocalhostDev,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let app = build_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    TestServer {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        _data_dir: data_dir,
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Operator-side create of a credential with a seeded value.
    pub async fn create_credential(&self, name: &str, description: &str, value: Option<&str>) {
        let response = self
            .client
            .post(self.url("/api/admin/credentials"))
            .json(&serde_json::json!({
                "name": name,
                "description": description,
                "value": value,
            }))
            .send()
            .await
            .expect("create credential");
        assert_eq!(response.status(), 201, "credential create failed");
    }

    pub async fn create_profile(&self, description: &str) -> String {
        let response = self
            .client
            .post(self.url("/profiles"))
            .json(&serde_json::json!({ "description": description }))
            .send()
            .await
            .expect("create profile");
        assert_eq!(response.status(), 201, "profile create failed");
        let body: Value = response.json().await.expect("profile body");
        body["id"].as_str().expect("profile id").to_string()
    }

    pub async fn attach_credentials(&self, profile_id: &str, names: &[&str]) {
        let response = self
            .client
            .post(self.url(&format!("/profiles/{profile_id}/credentials")))
            .json(&serde_json::json!({ "credentials": names }))
            .send()
            .await
            .expect("attach credentials");
        assert_eq!(response.status(), 200, "credential attach failed");
    }

    /// Locks the profile and returns `(key_id, secret)` from the one-time
    /// full key string.
    pub async fn lock_profile(&self, profile_id: &str) -> (String, String) {
        let response = self
            .client
            .post(self.url(&format!("/api/admin/profiles/{profile_id}/lock")))
            .send()
            .await
            .expect("lock profile");
        assert_eq!(response.status(), 200, "profile lock failed");
        let body: Value = response.json().await.expect("lock body");
        let key = body["key"].as_str().expect("full key");
        let (key_id, secret) = key.split_once(':').expect("two-part key");
        (key_id.to_string(), secret.to_string())
    }

    pub async fn revoke_profile(&self, profile_id: &str) {
        let response = self
            .client
            .post(self.url(&format!("/api/admin/profiles/{profile_id}/revoke")))
            .send()
            .await
            .expect("revoke profile");
        assert_eq!(response.status(), 200, "profile revoke failed");
    }

    /// Submits a script signed with `secret`; returns the raw response.
    pub async fn execute(
        &self,
        key_id: &str,
        secret: &str,
        script: &str,
        timeout: Option<u64>,
    ) -> reqwest::Response {
        let hash = airlock_profile::sign_script(secret, script);
        self.execute_with_hash(key_id, script, &hash, timeout).await
    }

    pub async fn execute_with_hash(
        &self,
        key_id: &str,
        script: &str,
        hash: &str,
        timeout: Option<u64>,
    ) -> reqwest::Response {
        let mut body = serde_json::json!({ "script": script, "hash": hash });
        if let Some(timeout) = timeout {
            body["timeout"] = serde_json::json!(timeout);
        }
        self.client
            .post(self.url("/execute"))
            .bearer_auth(key_id)
            .json(&body)
            .send()
            .await
            .expect("execute request")
    }

    /// Polls until the execution satisfies `predicate` or the deadline hits.
    pub async fn poll_until(
        &self,
        execution_id: &str,
        predicate: impl Fn(&Value) -> bool,
    ) -> Value {
        for _ in 0..300 {
            let response = self
                .client
                .get(self.url(&format!("/executions/{execution_id}")))
                .send()
                .await
                .expect("poll request");
            assert_eq!(response.status(), 200, "poll failed");
            let body: Value = response.json().await.expect("poll body");
            if predicate(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("execution '{execution_id}' never reached the expected state");
    }

    pub async fn poll_until_terminal(&self, execution_id: &str) -> Value {
        self.poll_until(execution_id, |body| {
            matches!(
                body["status"].as_str(),
                Some("completed") | Some("error") | Some("timeout")
            )
        })
        .await
    }
}

/// Extracts the accepted execution id from a 202 response.
pub async fn accepted_execution_id(response: reqwest::Response) -> String {
    assert_eq!(response.status(), 202, "execute was not accepted");
    let body: Value = response.json().await.expect("accept body");
    assert_eq!(body["status"], "pending");
    let execution_id = body["execution_id"].as_str().expect("execution id");
    assert_eq!(
        body["poll_url"].as_str().expect("poll url"),
        format!("/executions/{execution_id}")
    );
    execution_id.to_string()
}
