//! CLI contract tests
//!
//! Exercise the argument surface and the failure paths that resolve before
//! any console is contacted.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test fixture helpers
// =============================================================================

/// Empty config file in a scratch directory, so the user's own config is
/// never read.
fn empty_config() -> (TempDir, String) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("lparctl.toml");
    std::fs::write(&path, "").expect("write config");
    let path = path.to_string_lossy().to_string();
    (dir, path)
}

fn lparctl() -> Command {
    let mut cmd = Command::cargo_bin("lparctl").expect("binary built");
    cmd.env_remove("LPARCTL_TARGET")
        .env_remove("LPARCTL_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

// =============================================================================
// Help and usage
// =============================================================================

#[test]
fn help_lists_subcommands() {
    lparctl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("exec"))
        .stdout(predicate::str::contains("exec-int"))
        .stdout(predicate::str::contains("table"));
}

#[test]
fn table_help_lists_actions() {
    lparctl()
        .args(["table", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lookup"))
        .stdout(predicate::str::contains("remove"));
}

#[test]
fn missing_subcommand_is_usage_error() {
    lparctl().assert().failure().code(2);
}

#[test]
fn bad_uuid_is_rejected_by_parser() {
    lparctl()
        .args(["table", "add", "3", "--uuid", "not-a-uuid"])
        .assert()
        .failure()
        .code(2);
}

// =============================================================================
// Early failures
// =============================================================================

#[test]
fn no_target_is_reported() {
    let (_dir, config) = empty_config();
    lparctl()
        .args(["--config", &config, "exec", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no target given"));
}

#[test]
fn invalid_target_prints_hint() {
    let (_dir, config) = empty_config();
    lparctl()
        .args(["--config", &config, "--target", "http://hmc/sys", "exec", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid target"))
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn special_characters_in_managed_system_are_refused() {
    let (_dir, config) = empty_config();
    lparctl()
        .args([
            "--config",
            &config,
            "--target",
            "phyp://hmc/sys;rm",
            "table",
            "list",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("special characters"));
}

#[test]
fn missing_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");
    lparctl()
        .args(["--config", missing.to_str().unwrap(), "exec", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config error"));
}

#[test]
fn invalid_log_level_is_reported() {
    let (_dir, config) = empty_config();
    lparctl()
        .args(["--config", &config, "--log-level", "loud", "exec", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid log level"));
}
