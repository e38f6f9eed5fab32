//! Integration tests for the `glvault` CLI binary.
//!
//! Exercise the CLI as a subprocess, verifying exit codes and output for
//! flows that don't require a running server. Commands that call out to
//! the admin API are pointed at a non-existent address and checked for a
//! clean failure mode rather than a panic.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::process::Command;

fn glvault_bin() -> String {
    let path = env!("CARGO_BIN_EXE_glvault");
    assert!(Path::new(path).exists(), "glvault binary not found at {path}");
    path.to_owned()
}

fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(glvault_bin())
        .args(args)
        .env("GLVAULT_ADDR", "http://127.0.0.1:19999")
        .env_remove("GLVAULT_ADMIN_TOKEN")
        .output()
        .expect("failed to execute glvault");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

#[test]
fn version_flag_exits_zero() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0, "glvault --version should exit 0");
    assert!(stdout.contains("glvault"), "version output should mention glvault: {stdout}");
}

#[test]
fn help_flag_lists_every_subcommand() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0, "glvault --help should exit 0");
    for subcommand in ["register", "rotate", "list", "audit", "remove", "health"] {
        assert!(stdout.contains(subcommand), "help should list '{subcommand}': {stdout}");
    }
}

#[test]
fn register_without_admin_token_fails_before_any_request() {
    let (code, _, stderr) = run(&["register", "weather", "APIKEY1", "https://example.com"]);
    assert_ne!(code, 0, "register without a token should fail");
    assert!(
        stderr.contains("admin token") || stderr.contains("GLVAULT_ADMIN_TOKEN"),
        "should report the missing admin token: {stderr}"
    );
}

#[test]
fn list_without_admin_token_fails_before_any_request() {
    let (code, _, stderr) = run(&["list"]);
    assert_ne!(code, 0, "list without a token should fail");
    assert!(
        stderr.contains("admin token") || stderr.contains("GLVAULT_ADMIN_TOKEN"),
        "should report the missing admin token: {stderr}"
    );
}

#[test]
fn health_against_unreachable_server_fails_cleanly() {
    let (code, _, stderr) = run(&["health"]);
    assert_ne!(code, 0, "health against an unreachable server should fail");
    assert!(!stderr.is_empty(), "should print an error describing the connection failure");
}

#[test]
fn missing_subcommand_is_a_usage_error() {
    let (code, _, stderr) = run(&[]);
    assert_ne!(code, 0, "invoking with no subcommand should fail");
    assert!(
        stderr.contains("Usage") || stderr.contains("usage") || stderr.contains("required"),
        "should print usage guidance: {stderr}"
    );
}
