//! End-to-end tests running the driver binary as a separate process.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

const SUFFIX: &str = "_rendezvous.json";

fn spawn_driver(discovery_dir: &Path, extra: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_rdzv-driver"))
        .arg("--discovery-dir")
        .arg(discovery_dir)
        .args(["--address", "127.0.0.1"])
        .args(extra)
        .env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn rdzv-driver")
}

fn find_artifact(dir: &Path) -> Option<PathBuf> {
    fs::read_dir(dir).ok()?.filter_map(|e| e.ok()).map(|e| e.path()).find(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(SUFFIX) && !n.starts_with('.'))
            .unwrap_or(false)
    })
}

fn wait_for_artifact(dir: &Path, timeout: Duration) -> Option<PathBuf> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(path) = find_artifact(dir) {
            return Some(path);
        }
        thread::sleep(Duration::from_millis(25));
    }
    None
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> ExitStatus {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("rdzv-driver did not exit within {:?}", timeout);
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn send_signal(child: &Child, signal: &str) {
    let status = Command::new("kill")
        .args([signal, &child.id().to_string()])
        .status()
        .expect("failed to run kill");
    assert!(status.success());
}

#[test]
fn test_interrupt_removes_artifact_and_exits_zero() {
    let temp_dir = TempDir::new().unwrap();
    let mut child = spawn_driver(temp_dir.path(), &[]);

    let artifact = wait_for_artifact(temp_dir.path(), Duration::from_secs(20))
        .expect("discovery artifact was not published");

    let plan: serde_json::Value = serde_json::from_slice(&fs::read(&artifact).unwrap()).unwrap();
    let entries = plan.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["hostname"], "localhost");
    assert_eq!(entries[0]["rank"], 0);

    send_signal(&child, "-INT");
    let status = wait_for_exit(&mut child, Duration::from_secs(20));

    assert_eq!(status.code(), Some(0));
    assert!(!artifact.exists());
}

#[test]
fn test_terminate_removes_artifact_and_exits_zero() {
    let temp_dir = TempDir::new().unwrap();
    let mut child = spawn_driver(temp_dir.path(), &["-w", "hostA:2,hostB:1"]);

    let artifact = wait_for_artifact(temp_dir.path(), Duration::from_secs(20))
        .expect("discovery artifact was not published");
    let plan: serde_json::Value = serde_json::from_slice(&fs::read(&artifact).unwrap()).unwrap();
    assert_eq!(plan.as_array().unwrap().len(), 3);

    send_signal(&child, "-TERM");
    let status = wait_for_exit(&mut child, Duration::from_secs(20));

    assert_eq!(status.code(), Some(0));
    assert!(!artifact.exists());
}

#[test]
fn test_serve_timeout_exits_zero() {
    let temp_dir = TempDir::new().unwrap();
    let mut child = spawn_driver(temp_dir.path(), &["--serve-timeout", "1"]);

    let status = wait_for_exit(&mut child, Duration::from_secs(20));

    assert_eq!(status.code(), Some(0));
    assert!(find_artifact(temp_dir.path()).is_none());
}

#[test]
fn test_invalid_worker_list_exits_non_zero() {
    let temp_dir = TempDir::new().unwrap();
    let mut child = spawn_driver(temp_dir.path(), &["-w", "hostA:0"]);

    let status = wait_for_exit(&mut child, Duration::from_secs(20));

    assert_ne!(status.code(), Some(0));
    assert!(find_artifact(temp_dir.path()).is_none());
}

#[test]
fn test_insufficient_slots_exits_non_zero() {
    let temp_dir = TempDir::new().unwrap();
    let mut child = spawn_driver(temp_dir.path(), &["-w", "hostA:1", "-a", "3"]);

    let status = wait_for_exit(&mut child, Duration::from_secs(20));

    assert_eq!(status.code(), Some(1));
}

#[test]
fn test_oversized_worker_list_exits_one() {
    let temp_dir = TempDir::new().unwrap();
    let mut child = spawn_driver(
        temp_dir.path(),
        &["-w", "a:9223372036854775807,b:9223372036854775807"],
    );

    let status = wait_for_exit(&mut child, Duration::from_secs(20));

    assert_eq!(status.code(), Some(1));
    assert!(find_artifact(temp_dir.path()).is_none());
}
