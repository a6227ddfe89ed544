// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for the `jmap-test` binary.

use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::io::Write;

fn jmap_test() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("jmap-test").expect("binary `jmap-test` should be built");
    for var in ["JCT_SESSION_URL", "JCT_LOG_LEVEL", "JCT_RELAY_URL", "JCT_TIMEOUT_MS", "RUST_LOG"] {
        cmd.env_remove(var);
    }
    cmd
}

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

// ── Help & version ──────────────────────────────────────────────────

#[test]
fn help_flag_prints_usage() {
    jmap_test()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("JMAP mail server conformance tests"))
        .stdout(contains("--config"))
        .stdout(contains("--filter"))
        .stdout(contains("schema"));
}

#[test]
fn version_flag_prints_version() {
    jmap_test()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

// ── Configuration errors ────────────────────────────────────────────

#[test]
fn run_without_config_is_fatal() {
    jmap_test()
        .assert()
        .code(2)
        .stderr(contains("CONFIG_UNREADABLE"));
}

#[test]
fn missing_config_file_is_fatal() {
    jmap_test()
        .args(["-c", "/definitely/not/here.toml"])
        .assert()
        .code(2)
        .stderr(contains("config file not found"));
}

#[test]
fn unparseable_config_is_fatal() {
    let file = config_file("session_url = [unterminated");
    jmap_test()
        .arg("-c")
        .arg(file.path())
        .assert()
        .code(2)
        .stderr(contains("CONFIG_INVALID"));
}

#[test]
fn invalid_config_lists_every_problem() {
    let file = config_file("session_url = \"\"\ntimeout_ms = 0\nlog_level = \"loud\"\n");
    jmap_test()
        .arg("-c")
        .arg(file.path())
        .assert()
        .code(2)
        .stderr(contains("session_url is required"))
        .stderr(contains("timeout_ms 0 out of range"))
        .stderr(contains("invalid log_level 'loud'"));
}

#[test]
fn unreachable_server_is_fatal() {
    let file = config_file(
        "session_url = \"http://127.0.0.1:9/.well-known/jmap\"\n\
         timeout_ms = 2000\n\
         relay_url = \"\"\n\
         [accounts.primary]\n\
         username = \"alice\"\n\
         password = \"secret\"\n",
    );
    jmap_test()
        .arg("-c")
        .arg(file.path())
        .assert()
        .code(2)
        .stdout(predicates::str::is_empty());
}

// ── Subcommands ─────────────────────────────────────────────────────

#[test]
fn list_prints_the_catalog() {
    jmap_test()
        .arg("list")
        .assert()
        .success()
        .stdout(contains("core/echo-basic"))
        .stdout(contains("mailbox/get-all"))
        .stdout(contains("RFC8621"));
}

#[test]
fn list_honours_the_filter() {
    let output = jmap_test()
        .args(["list", "--filter", "email/query*"])
        .output()
        .expect("run list");
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.is_empty());
    for line in stdout.lines() {
        assert!(line.starts_with("email/query"), "{line}");
    }
}

#[test]
fn run_flags_are_accepted_after_the_subcommand() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("report.json");
    jmap_test()
        .arg("list")
        .args(["-f", "--fail-only", "--verbose", "-o"])
        .arg(&report)
        .args(["--filter", "core/echo-basic"])
        .assert()
        .success()
        .stdout(contains("core/echo-basic"))
        .stderr(contains("unexpected argument").not());
}

#[test]
fn list_drops_submission_without_secondary_account() {
    let output = jmap_test().arg("list").output().expect("run list");
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.contains("submission/"));
}

#[test]
fn schema_prints_config_schema() {
    let output = jmap_test().arg("schema").output().expect("run schema");
    assert!(output.status.success());
    let schema: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(schema["properties"]["session_url"].is_object());
}

#[test]
fn schema_prints_report_schema() {
    jmap_test()
        .args(["schema", "report"])
        .assert()
        .success()
        .stdout(contains("requiredFailed"));
}
