//! CLI Integration Tests
//!
//! Drives the `minirpc` binary against an in-process Echo server.

use minirpc_cli::echo;
use minirpc_server::{Server, ServerConfig, ServerHandle, ServerOptions};
use serde_json::Value;
use std::process::{Command, Output};

async fn start_echo() -> ServerHandle {
    let mut server = Server::new(
        ServerConfig::default().with_addr("127.0.0.1:0"),
        ServerOptions::default(),
    );
    server.register_service(echo::service()).unwrap();
    server.start().await.unwrap()
}

/// Runs the binary off the runtime threads so the server keeps serving.
async fn minirpc(args: Vec<String>) -> Output {
    tokio::task::spawn_blocking(move || {
        Command::new(env!("CARGO_BIN_EXE_minirpc"))
            .args(&args)
            .env_remove("MINIRPC_TARGET")
            .output()
            .unwrap()
    })
    .await
    .unwrap()
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_help_lists_subcommands() {
    let output = Command::new(env!("CARGO_BIN_EXE_minirpc"))
        .arg("--help")
        .output()
        .unwrap();
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("serve"));
    assert!(text.contains("call"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_ping_prints_json() {
    let handle = start_echo().await;
    let addr = handle.local_addr().to_string();

    let output = minirpc(args(&["call", &addr, "/Echo/Ping", "-d", r#"{"n":1}"#])).await;
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value, serde_json::json!({"n": 1}));

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_say_enveloped() {
    let handle = start_echo().await;
    let addr = handle.local_addr().to_string();

    let output = minirpc(args(&[
        "call",
        &addr,
        "/Echo/Say",
        "-d",
        r#"{"text":"hi"}"#,
        "--envelope",
    ]))
    .await;
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["text"], "hi");

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_fail_exits_nonzero() {
    let handle = start_echo().await;
    let addr = handle.local_addr().to_string();

    let output = minirpc(args(&["call", &addr, "/Echo/Fail", "--envelope"])).await;
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("echo asked to fail"), "stderr: {}", stderr);

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_unknown_path() {
    let handle = start_echo().await;
    let addr = handle.local_addr().to_string();

    let output = minirpc(args(&["call", &addr, "/Echo/Nope"])).await;
    assert!(!output.status.success());

    handle.stop().await;
}
