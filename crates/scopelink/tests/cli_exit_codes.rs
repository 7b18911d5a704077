#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::Command;

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/sclcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

#[test]
fn send_without_bridge_returns_3() {
    let dir = unique_temp_dir("missing");
    let output = Command::new(env!("CARGO_BIN_EXE_scopelink"))
        .args(["send", "nobody", "--base-path"])
        .arg(format!("{}/", dir.display()))
        .args(["--data", "x"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn oversize_payload_returns_60() {
    let output = Command::new(env!("CARGO_BIN_EXE_scopelink"))
        .args(["send", "scope", "--buffer-capacity", "8", "--data", "hello"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(60));
}

#[test]
fn bad_hex_returns_64() {
    let output = Command::new(env!("CARGO_BIN_EXE_scopelink"))
        .args(["send", "scope", "--hex", "0g"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn serve_refuses_to_replace_foreign_file() {
    let dir = unique_temp_dir("occupied");
    std::fs::write(dir.join("scopeTX"), b"not a socket").expect("file should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_scopelink"))
        .args(["--log-level", "error", "serve", "scope", "--base-path"])
        .arg(format!("{}/", dir.display()))
        .output()
        .expect("serve should run");

    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("address already in use"));
    assert_eq!(
        std::fs::read(dir.join("scopeTX")).expect("file should survive"),
        b"not a socket"
    );
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_buffer_capacity_returns_64() {
    let dir = unique_temp_dir("capacity");
    let output = Command::new(env!("CARGO_BIN_EXE_scopelink"))
        .args(["--log-level", "error", "serve", "scope", "--buffer-capacity", "6"])
        .arg("--base-path")
        .arg(format!("{}/", dir.display()))
        .output()
        .expect("serve should run");

    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_crate_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_scopelink"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("scopelink {}", env!("CARGO_PKG_VERSION"))
    );
}
