//! Integration tests against a real tmux server.
//!
//! Every test bails out silently when tmux is not installed, so the suite
//! stays green on minimal CI images while still exercising the real paste
//! and capture paths on developer machines.

use cab_daemon::adapters::build_flag_command;
use cab_daemon::tmux::{CaptureOptions, CreateSessionOptions, TmuxDriver};
use std::collections::BTreeMap;
use std::time::Duration;

fn tmux_available() -> bool {
    which::which("tmux").is_ok()
}

fn unique_name(prefix: &str) -> String {
    format!("{prefix}-{}", std::process::id())
}

async fn cleanup(driver: &TmuxDriver, name: &str) {
    let _ = driver.kill_session(name).await;
}

#[tokio::test]
async fn test_create_exists_kill_roundtrip() {
    if !tmux_available() {
        return;
    }
    let driver = TmuxDriver::new();
    let name = unique_name("cab-test-lifecycle");

    driver
        .create_session(&name, &CreateSessionOptions::default())
        .await
        .unwrap();
    assert!(driver.session_exists(&name).await.unwrap());

    // Creating the same name again is a conflict.
    let err = driver
        .create_session(&name, &CreateSessionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        cab_core::error::BridgeError::AlreadyExists(_)
    ));

    assert!(driver.kill_session(&name).await.unwrap());
    assert!(!driver.session_exists(&name).await.unwrap());
}

#[tokio::test]
async fn test_list_sessions_reports_created() {
    if !tmux_available() {
        return;
    }
    let driver = TmuxDriver::new();
    let name = unique_name("cab-test-list");
    driver
        .create_session(&name, &CreateSessionOptions::default())
        .await
        .unwrap();

    let sessions = driver.list_sessions().await.unwrap();
    assert!(sessions.iter().any(|s| s.name == name));

    cleanup(&driver, &name).await;
}

/// Prompt paste round-trip: pasted text must appear in the pane.
#[tokio::test]
async fn test_paste_appears_in_capture() {
    if !tmux_available() {
        return;
    }
    let driver = TmuxDriver::new();
    let name = unique_name("cab-test-paste");
    driver
        .create_session(&name, &CreateSessionOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    driver
        .paste_buffer(&name, "echo hello", true, &Default::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(700)).await;

    let captured = driver
        .capture_pane(&name, &CaptureOptions::default())
        .await
        .unwrap();
    assert!(
        captured.contains("echo hello"),
        "pane capture missing paste: {captured}"
    );

    cleanup(&driver, &name).await;
}

/// Shell-injection resistance: a quoted flag value typed into the session
/// must not execute as a command.
#[tokio::test]
async fn test_quoted_flag_value_does_not_execute() {
    if !tmux_available() {
        return;
    }
    let marker_dir = tempfile::tempdir().unwrap();
    let marker = marker_dir.path().join("rce");
    let payload = format!("x; touch {}", marker.display());

    let mut flags = BTreeMap::new();
    flags.insert("model".to_string(), payload.clone());
    let command = build_flag_command("echo", &flags).unwrap();
    assert_eq!(command, format!("echo --model '{payload}'"));

    let driver = TmuxDriver::new();
    let name = unique_name("cab-test-inject");
    driver
        .create_session(
            &name,
            &CreateSessionOptions {
                command: Some(command),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(
        !marker.exists(),
        "quoted flag value executed as a shell command"
    );

    cleanup(&driver, &name).await;
}
