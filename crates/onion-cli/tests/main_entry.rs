//! Integration tests for the `onionctl` binary entry point.
//!
//! Exercises help output, usage failures and the stub-mode diagnostics
//! without a running daemon.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use predicates::str::contains;

#[test]
fn help_lists_the_subcommands() {
    let mut command = cargo_bin_cmd!("onionctl");
    command.arg("--help");
    command
        .assert()
        .success()
        .stdout(contains("up").and(contains("check")).and(contains("provision")));
}

#[test]
fn a_bare_invocation_is_a_usage_error() {
    let mut command = cargo_bin_cmd!("onionctl");
    command.assert().code(2).stderr(contains("Usage"));
}

#[test]
fn stub_mode_checks_pass_without_a_daemon() {
    let mut command = cargo_bin_cmd!("onionctl");
    command.env("ONION_STUB_MODE", "true").arg("check");
    command
        .assert()
        .success()
        .stdout(contains("[check] connect : PASS").and(contains("[check] round_trip : PASS")));
}

#[test]
fn unknown_auth_modes_are_rejected() {
    let mut command = cargo_bin_cmd!("onionctl");
    command.args(["--auth-mode", "telepathy", "check"]);
    command
        .assert()
        .failure()
        .stderr(contains("failed to load configuration"));
}

#[test]
fn stub_mode_flag_accepts_an_explicit_value() {
    let mut command = cargo_bin_cmd!("onionctl");
    command.args(["--stub-mode", "true", "check"]);
    command
        .assert()
        .success()
        .stdout(contains("[check] publish : PASS"));
}

#[test]
fn stub_mode_from_a_configuration_file_is_honoured() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("onion.toml");
    std::fs::write(&path, "stub_mode = true\n").expect("write config");

    let mut command = cargo_bin_cmd!("onionctl");
    command
        .arg("--config-path")
        .arg(&path)
        .arg("check");
    command
        .assert()
        .success()
        .stdout(contains("[check] round_trip : PASS"));
}

#[test]
fn explicit_false_overrides_stub_mode_from_the_environment() {
    let mut command = cargo_bin_cmd!("onionctl");
    command
        .env("ONION_STUB_MODE", "true")
        .env("ONION_CONTROL_PORT", "1")
        .args(["--stub-mode=false", "check"]);
    command
        .assert()
        .failure()
        .stdout(contains("[check] connect : FAIL"));
}
