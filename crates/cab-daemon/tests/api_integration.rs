//! REST surface integration tests against a live server on an ephemeral
//! port, with an in-memory tmux standing in for the real one.

use cab_core::error::{BridgeError, Result};
use cab_core::BridgeConfig;
use cab_daemon::adapters::AdapterRegistry;
use cab_daemon::api::{self, ApiState};
use cab_daemon::hooks::HookDecoder;
use cab_daemon::supervisor::SessionSupervisor;
use cab_daemon::tmux::{
    CaptureOptions, CreateSessionOptions, TargetOptions, TmuxControl, TmuxSessionInfo,
};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct StubTmux {
    sessions: Mutex<HashSet<String>>,
}

#[async_trait::async_trait]
impl TmuxControl for StubTmux {
    async fn create_session(&self, name: &str, _opts: &CreateSessionOptions) -> Result<()> {
        self.sessions.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<bool> {
        Ok(self.sessions.lock().unwrap().remove(name))
    }

    async fn session_exists(&self, name: &str) -> Result<bool> {
        Ok(self.sessions.lock().unwrap().contains(name))
    }

    async fn list_sessions(&self) -> Result<Vec<TmuxSessionInfo>> {
        Ok(Vec::new())
    }

    async fn send_keys(&self, _target: &str, _keys: &str, _opts: &TargetOptions) -> Result<()> {
        Ok(())
    }

    async fn paste_buffer(
        &self,
        _target: &str,
        _text: &str,
        _send_enter: bool,
        _opts: &TargetOptions,
    ) -> Result<()> {
        Ok(())
    }

    async fn send_interrupt(&self, _target: &str) -> Result<()> {
        Ok(())
    }

    async fn capture_pane(&self, _target: &str, _opts: &CaptureOptions) -> Result<String> {
        Err(BridgeError::NotFound("pane".to_string()))
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    _data_dir: tempfile::TempDir,
    project: tempfile::TempDir,
}

async fn start_server() -> TestServer {
    let data_dir = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let mut config = BridgeConfig::default();
    config.data_dir = data_dir.path().to_path_buf();

    let registry = Arc::new(AdapterRegistry::with_builtins());
    let supervisor = SessionSupervisor::new(
        config.clone(),
        Arc::new(StubTmux::default()),
        Arc::clone(&registry),
    );
    let decoder = Arc::new(HookDecoder::new(registry, None));

    let state = ApiState {
        supervisor,
        decoder,
        config: Arc::new(config),
        clients: Arc::new(AtomicUsize::new(0)),
        history: Arc::new(Mutex::new(std::collections::VecDeque::new())),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::router(state)).await.unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        _data_dir: data_dir,
        project,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = start_server().await;
    let body: Value = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
    assert_eq!(body["clients"], 0);
}

#[tokio::test]
async fn test_session_crud_over_http() {
    let server = start_server().await;

    // Create.
    let response = server
        .client
        .post(format!("{}/sessions", server.base))
        .json(&json!({ "cwd": server.project.path(), "name": "my-session" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let session: Value = response.json().await.unwrap();
    assert_eq!(session["kind"], "internal");
    assert_eq!(session["name"], "my-session");
    assert_eq!(session["status"], "working");
    let id = session["id"].as_str().unwrap().to_string();

    // List + filter.
    let sessions: Vec<Value> = server
        .client
        .get(format!("{}/sessions?agent=claude", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
    let none: Vec<Value> = server
        .client
        .get(format!("{}/sessions?type=external", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(none.is_empty());

    // Rename.
    let renamed: Value = server
        .client
        .patch(format!("{}/sessions/{id}", server.base))
        .json(&json!({ "name": "renamed" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(renamed["name"], "renamed");

    // Delete.
    let deleted: Value = server
        .client
        .delete(format!("{}/sessions/{id}", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(deleted["success"], true);

    let response = server
        .client
        .get(format!("{}/sessions/{id}", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_event_intake_links_session() {
    let server = start_server().await;

    let response = server
        .client
        .post(format!("{}/sessions", server.base))
        .json(&json!({ "cwd": server.project.path() }))
        .send()
        .await
        .unwrap();
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap();

    let response = server
        .client
        .post(format!("{}/event", server.base))
        .json(&json!({
            "hook_event_name": "SessionStart",
            "session_id": "A",
            "cwd": server.project.path(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let session: Value = server
        .client
        .get(format!("{}/sessions/{id}", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["agentSessionId"], "A");
    assert_eq!(session["status"], "working");
}

#[tokio::test]
async fn test_prompt_requires_body() {
    let server = start_server().await;
    let response = server
        .client
        .post(format!("{}/sessions", server.base))
        .json(&json!({ "cwd": server.project.path() }))
        .send()
        .await
        .unwrap();
    let created: Value = response.json().await.unwrap();
    let id = created["id"].as_str().unwrap();

    let response = server
        .client
        .post(format!("{}/sessions/{id}/prompt", server.base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Missing prompt");

    let response = server
        .client
        .post(format!("{}/sessions/{id}/prompt", server.base))
        .json(&json!({ "prompt": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_unknown_route_and_bad_body() {
    let server = start_server().await;

    let response = server
        .client
        .get(format!("{}/nope", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Not found");

    let response = server
        .client
        .post(format!("{}/sessions", server.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_cors_mirrors_allowed_origin() {
    let server = start_server().await;

    let response = server
        .client
        .get(format!("{}/health", server.base))
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://localhost:3000"
    );

    let response = server
        .client
        .get(format!("{}/health", server.base))
        .header("origin", "http://evil.example.com")
        .send()
        .await
        .unwrap();
    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_none());

    // Preflight.
    let response = server
        .client
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/sessions", server.base),
        )
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn test_unclaimed_event_still_accepted() {
    let server = start_server().await;
    let response = server
        .client
        .post(format!("{}/event", server.base))
        .json(&json!({ "type": "mystery", "anything": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
}
