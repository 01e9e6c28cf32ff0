//! Integration tests for JSON log output from the CLI
//!
//! Every non-empty stderr line must be a JSON object carrying the standard
//! tracing fields.
#![cfg(unix)]

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_json_logging_output_schema() {
    let temp = TempDir::new().unwrap();
    let recipe = temp.path().join("image.toml");
    fs::write(
        &recipe,
        r#"
[[actions]]
action = "run"
command = "echo from-the-action"
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("imagesmith").unwrap();
    let output = cmd
        .env_remove("RUST_LOG")
        .env_remove("IMAGESMITH_LOG")
        .args(["--log-format", "json", "--log-level", "debug", "run"])
        .arg(&recipe)
        .arg("--rootdir")
        .arg(temp.path().join("root"))
        .output()
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);

    let mut lines = 0;
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        let json: Value = serde_json::from_str(line)
            .unwrap_or_else(|e| panic!("Failed to parse JSON line: {}\nError: {}", line, e));
        assert!(json.get("timestamp").is_some(), "missing timestamp: {}", line);
        assert!(json.get("level").is_some(), "missing level: {}", line);
        assert!(json.get("fields").is_some(), "missing fields: {}", line);
        lines += 1;
    }
    assert!(lines > 0, "expected at least one log line");
    assert!(stderr.contains("from-the-action"));
    assert!(stderr.contains(&format!(
        "imagesmith-core {}",
        imagesmith_core::version()
    )));
}

#[test]
fn test_log_format_from_environment() {
    let temp = TempDir::new().unwrap();
    let recipe = temp.path().join("image.toml");
    fs::write(
        &recipe,
        r#"
[[actions]]
action = "run"
command = "true"
"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("imagesmith").unwrap();
    let output = cmd
        .env("IMAGESMITH_LOG_FORMAT", "json")
        .env("IMAGESMITH_LOG", "info")
        .arg("verify")
        .arg(&recipe)
        .output()
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        assert!(
            serde_json::from_str::<Value>(line).is_ok(),
            "not JSON: {}",
            line
        );
    }
}
