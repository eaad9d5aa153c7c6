//! tests/cli_tests.rs
//!
//! Smoke tests for the `contract-flow` binary. None of them reach a node.

use assert_cmd::Command;

fn contains(haystack: &[u8], needle: &str) -> bool {
    String::from_utf8_lossy(haystack).contains(needle)
}

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("contract-flow").unwrap();
    cmd.env_remove("CONTRACT_FLOW_ADDRESS")
        .env_remove("CONTRACT_FLOW_PRIVATE_KEY")
        .env_remove("CONTRACT_FLOW_RPC_URL");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let output = cli().arg("--help").output().unwrap();
    assert!(output.status.success());
    for sub in ["block-number", "code", "deploy", "send", "events", "read"] {
        assert!(contains(&output.stdout, sub), "missing {}", sub);
    }
}

#[test]
fn test_deploy_without_credentials_fails() {
    let output = cli()
        .args(["--endpoint", "http://127.0.0.1:1", "deploy", "--abi", "x.abi", "--bin", "x.bin"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(contains(&output.stderr, "CONTRACT_FLOW_ADDRESS"));
}

#[test]
fn test_invalid_endpoint_fails() {
    let output = cli().args(["--endpoint", "ftp://example.org", "block-number"]).output().unwrap();
    assert!(!output.status.success());
    assert!(contains(&output.stderr, "scheme"));
}

#[test]
fn test_explicit_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let output = cli()
        .args(["--config", missing.to_str().unwrap(), "block-number"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(contains(&output.stderr, "not found"));
}
