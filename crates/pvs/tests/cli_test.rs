//! Integration tests for the `pvs` CLI binary.
//!
//! These tests cover argument parsing, help output, configuration
//! commands, and error handling, all without a live gateway.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `pvs` binary with env isolation.
///
/// Clears all `PVS_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn pvs_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("pvs");
    cmd.env("HOME", "/tmp/pvs-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/pvs-cli-test-nonexistent")
        .env_remove("PVS_PROFILE")
        .env_remove("PVS_CONFIG")
        .env_remove("PVS_HOST")
        .env_remove("PVS_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = pvs_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    pvs_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("watch")
            .and(predicate::str::contains("snapshot"))
            .and(predicate::str::contains("live-fields"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    pvs_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pvs"));
}

#[test]
fn test_unknown_subcommand() {
    pvs_cmd().arg("frobnicate").assert().failure().code(2);
}

// ── live-fields ─────────────────────────────────────────────────────

#[test]
fn test_live_fields_table() {
    pvs_cmd().arg("live-fields").assert().success().stdout(
        predicate::str::contains("/sys/livedata/pv_p")
            .and(predicate::str::contains("backupTimeRemaining"))
            .and(predicate::str::contains("timestamp"))
            .and(predicate::str::contains("midstate")),
    );
}

#[test]
fn test_live_fields_json() {
    let output = pvs_cmd().args(["live-fields", "--json"]).output().unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 12);
    assert_eq!(rows[0]["wire"], "time");
    assert_eq!(rows[0]["kind"], "timestamp");
}

// ── config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    pvs_cmd()
        .args(["--config", "/tmp/pvs-somewhere/config.toml", "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/tmp/pvs-somewhere/config.toml"));
}

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let path_str = path.to_str().unwrap();

    pvs_cmd()
        .args([
            "--config",
            path_str,
            "config",
            "init",
            "192.168.1.50",
            "--name",
            "home",
            "--password-env",
            "HOME_PVS_PW",
            "--update-period",
            "15",
        ])
        .assert()
        .success();

    pvs_cmd()
        .args(["--config", path_str, "config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("default_profile = \"home\"")
                .and(predicate::str::contains("[profiles.home]"))
                .and(predicate::str::contains("host = \"192.168.1.50\""))
                .and(predicate::str::contains("update_period_s = 15"))
                .and(predicate::str::contains("password_env = \"HOME_PVS_PW\"")),
        );
}

#[test]
fn test_config_show_masks_password() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[profiles.default]\nhost = \"10.0.0.2\"\npassword = \"hunter2\"\n",
    )
    .unwrap();

    pvs_cmd()
        .args(["--config", path.to_str().unwrap(), "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("****").and(predicate::str::contains("hunter2").not()));
}

#[test]
fn test_config_init_rejects_zero_period() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    pvs_cmd()
        .args([
            "--config",
            path.to_str().unwrap(),
            "config",
            "init",
            "10.0.0.2",
            "--update-period",
            "0",
        ])
        .assert()
        .failure()
        .code(2);
    assert!(!path.exists());
}

// ── Gateway commands without a gateway ──────────────────────────────

#[test]
fn test_snapshot_without_host_or_profile() {
    let dir = tempfile::tempdir().unwrap();
    let output = pvs_cmd()
        .args([
            "--config",
            dir.path().join("config.toml").to_str().unwrap(),
            "snapshot",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("No gateway configured"), "{text}");
}

#[test]
fn test_watch_rejects_zero_update_period() {
    let dir = tempfile::tempdir().unwrap();
    let output = pvs_cmd()
        .args([
            "--config",
            dir.path().join("config.toml").to_str().unwrap(),
            "--host",
            "10.0.0.2",
            "--password",
            "pw",
            "watch",
            "--update-period",
            "0",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("update_period_s"), "{text}");
}

#[test]
fn test_watch_rejects_unknown_field() {
    let output = pvs_cmd()
        .args(["watch", "--fields", "pv_p,solar_flux"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("solar_flux"), "{text}");
}

#[test]
fn test_unknown_profile() {
    let dir = tempfile::tempdir().unwrap();
    let output = pvs_cmd()
        .args([
            "--config",
            dir.path().join("config.toml").to_str().unwrap(),
            "--profile",
            "shed",
            "snapshot",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("shed"), "{text}");
}
