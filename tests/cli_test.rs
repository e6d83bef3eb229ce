//! CLI end-to-end tests.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

#[allow(deprecated)]
fn readly_cmd() -> Command {
    let mut cmd = Command::cargo_bin("readly").unwrap();
    cmd.env_remove("READLY_ADMIN_PASSWORD")
        .env_remove("ADMIN_PASSWORD")
        .env_remove("READLY_ENVIRONMENT")
        .env_remove("ENVIRONMENT")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    fs::write(
        &path,
        format!(
            "[storage]\ndata_dir = \"{}\"\n{}",
            dir.join("data").display(),
            extra
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    readly_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version() {
    readly_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("readly "));
}

#[test]
fn test_cli_generate_secret() {
    let output = readly_cmd().arg("generate-secret").output().unwrap();
    assert!(output.status.success());

    let secret = String::from_utf8(output.stdout).unwrap();
    let secret = secret.trim();
    assert_eq!(secret.len(), 64);
    assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_cli_admin_token_requires_password() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "");

    readly_cmd()
        .args(["--config", config.to_str().unwrap(), "admin-token"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot derive admin token"));
}

#[test]
fn test_cli_admin_token_from_env() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "");

    let first = readly_cmd()
        .env("ADMIN_PASSWORD", "pw")
        .args(["--config", config.to_str().unwrap(), "admin-token"])
        .output()
        .unwrap();
    assert!(first.status.success());
    let token = String::from_utf8(first.stdout).unwrap();
    assert_eq!(token.trim().len(), 64);

    let second = readly_cmd()
        .args(["--config", config.to_str().unwrap(), "admin-token"])
        .env("READLY_ADMIN_PASSWORD", "pw")
        .output()
        .unwrap();
    assert_eq!(String::from_utf8(second.stdout).unwrap(), token);
}

#[test]
fn test_cli_validate() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "[rate_limit]\nmax_per_day = 10\n");

    readly_cmd()
        .args(["validate", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Rate limit: 10 per day"));
}

#[test]
fn test_cli_validate_rejects_bad_values() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "[rate_limit]\nmax_per_day = 0\n");

    readly_cmd()
        .args(["validate", config.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_per_day"));
}

#[test]
fn test_cli_validate_missing_file() {
    readly_cmd()
        .args(["validate", "/nonexistent/readly.toml"])
        .assert()
        .failure();
}

#[test]
fn test_cli_cleanup_empty_store() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "");

    readly_cmd()
        .args(["--config", config.to_str().unwrap(), "cleanup", "--days", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 0 conversions older than 3 days"));

    assert!(temp.path().join("data").exists());
}

#[test]
fn test_cli_stats_empty_store() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "");

    let output = readly_cmd()
        .args(["--config", config.to_str().unwrap(), "stats"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stats"]["total_conversions"], 0);
    assert_eq!(report["engagement"]["total_devices"], 0);
}
