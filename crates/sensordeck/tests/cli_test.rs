//! Integration tests for the `sensordeck` CLI binary.
//!
//! Argument parsing, help output, completions and error handling run
//! against an isolated home directory. Registry commands run against a
//! wiremock server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// `sensordeck` with every `SENSORDECK_*` variable cleared and the home
/// and XDG directories pointed at `home`.
fn sensordeck_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("sensordeck");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("NO_COLOR", "1")
        .env_remove("SENSORDECK_PROFILE")
        .env_remove("SENSORDECK_CONFIG")
        .env_remove("SENSORDECK_OUTPUT")
        .env_remove("SENSORDECK_LOG")
        .env_remove("SENSORDECK_REGISTRY_URL")
        .env_remove("SENSORDECK_STREAM_URL")
        .env_remove("SENSORDECK_DEFAULT_FILTER");
    cmd
}

fn isolated() -> (tempfile::TempDir, assert_cmd::Command) {
    let home = tempfile::tempdir().unwrap();
    let cmd = sensordeck_cmd(home.path());
    (home, cmd)
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn sensor_json(id: &str, device: &str, kind: &str) -> serde_json::Value {
    json!({ "id": id, "name": format!("{id}-name"), "type": kind, "deviceId": device, "period": "PT2S", "enabled": true })
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let (_home, mut cmd) = isolated();
    let output = cmd.output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let (_home, mut cmd) = isolated();
    cmd.arg("--help").assert().success().stdout(
        predicate::str::contains("sensors")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("filter")),
    );
}

#[test]
fn test_version_flag() {
    let (_home, mut cmd) = isolated();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sensordeck"));
}

#[test]
fn test_completions_bash() {
    let (_home, mut cmd) = isolated();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_invalid_output_format() {
    let (_home, mut cmd) = isolated();
    let output = cmd.args(["-o", "xml", "config", "show"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("xml"));
}

// ── Config & filter (offline) ───────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let (home, mut cmd) = isolated();
    let file = home.path().join("custom.toml");
    cmd.args(["--config", file.to_str().unwrap(), "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_init_then_refuses_overwrite() {
    let home = tempfile::tempdir().unwrap();
    let file = home.path().join("sd.toml");
    let file_arg = file.to_str().unwrap();

    sensordeck_cmd(home.path())
        .args(["-q", "--config", file_arg, "config", "init"])
        .args(["--registry-url", "http://lab:9000/iot/"])
        .assert()
        .success();
    let written = std::fs::read_to_string(&file).unwrap();
    assert!(written.contains("http://lab:9000/iot/"));

    let output = sensordeck_cmd(home.path())
        .args(["--config", file_arg, "config", "init"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("already exists"));
}

#[test]
fn test_config_show_as_json_has_defaults() {
    let (_home, mut cmd) = isolated();
    let output = cmd.args(["-o", "json", "config", "show"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["window_secs"], 60);
    assert_eq!(value["coalesce_quiet_ms"], 150);
}

#[test]
fn test_unknown_profile_is_usage_error() {
    let (_home, mut cmd) = isolated();
    let output = cmd.args(["-p", "prod", "sensors", "list"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("prod"));
}

#[test]
fn test_filter_set_then_show() {
    let home = tempfile::tempdir().unwrap();

    sensordeck_cmd(home.path())
        .args(["filter", "set", "12-10,15"])
        .assert()
        .success();

    sensordeck_cmd(home.path())
        .args(["-o", "plain", "filter", "show"])
        .assert()
        .success()
        .stdout(predicate::str::diff("10-12,15\n"));
}

#[test]
fn test_filter_rejects_empty_selection() {
    let (_home, mut cmd) = isolated();
    let output = cmd.args(["filter", "set", "abc"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("selects no devices"));
}

#[test]
fn test_filter_check_reports_matches() {
    let (_home, mut cmd) = isolated();
    cmd.args(["-o", "plain", "filter", "check", "1-3", "-d", "2", "-d", "7"])
        .assert()
        .success()
        .stdout(predicate::str::diff("2\ttrue\n7\tfalse\n"));
}

// ── Registry commands ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_sensors_list_filters_and_sorts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/iot/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            sensor_json("s3", "12", "HUMIDITY"),
            sensor_json("s1", "11", "THERMOMETER"),
            sensor_json("s2", "40", "MOTION"),
        ])))
        .mount(&server)
        .await;

    let (_home, mut cmd) = isolated();
    cmd.args(["--registry-url", &format!("{}/iot/", server.uri())])
        .args(["-o", "plain", "sensors", "list", "--filter", "10-20"])
        .assert()
        .success()
        .stdout(predicate::str::diff("s1\ns3\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sensors_add_validates_before_calling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iot/add"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_home, mut cmd) = isolated();
    let output = cmd
        .args(["--registry-url", &format!("{}/iot/", server.uri())])
        .args(["sensors", "add", "-n", "attic", "-t", "humidity", "-d", "twelve"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("not a number"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sensors_delete_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/iot/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such sensor"))
        .mount(&server)
        .await;

    let (_home, mut cmd) = isolated();
    let output = cmd
        .args(["--registry-url", &format!("{}/iot/", server.uri())])
        .args(["-y", "sensors", "delete", "ghost"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("sensors list"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sensors_delete_needs_yes_without_tty() {
    let (_home, mut cmd) = isolated();
    let output = cmd
        .args(["--registry-url", "http://127.0.0.1:9/iot/"])
        .args(["sensors", "delete", "s1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("--yes"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sensors_adjust_prints_new_bias() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/iot/s1/adjust"))
        .and(query_param("delta", "-0.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "bias": 1.25 })))
        .expect(1)
        .mount(&server)
        .await;

    let (_home, mut cmd) = isolated();
    cmd.args(["--registry-url", &format!("{}/iot/", server.uri())])
        .args(["-o", "plain", "sensors", "adjust", "s1", "-0.5"])
        .assert()
        .success()
        .stdout(predicate::str::diff("1.25\n"));
}

#[test]
fn test_unreachable_registry_is_connection_error() {
    let (_home, mut cmd) = isolated();
    let output = cmd
        .args(["--registry-url", "http://127.0.0.1:9/iot/", "--timeout", "2"])
        .args(["sensors", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7));
    assert!(combined_output(&output).contains("127.0.0.1:9"));
}
