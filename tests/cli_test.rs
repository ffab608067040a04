use assert_cmd::cargo;
use predicates::prelude::*;

#[test]
fn test_cli_help() {
    let mut cmd = cargo::cargo_bin_cmd!("sitepulse");
    cmd.arg("--help")
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("audit"));
}

#[test]
fn test_audit_help() {
    let mut cmd = cargo::cargo_bin_cmd!("sitepulse");
    cmd.args(["audit", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<URL>"))
        .stdout(predicate::str::contains("--max-pages"))
        .stdout(predicate::str::contains("--ignore-robots"));
}

#[test]
fn test_audit_rejects_url_without_scheme() {
    let mut cmd = cargo::cargo_bin_cmd!("sitepulse");
    cmd.args(["audit", "example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "URL must start with http:// or https://",
        ));
}

#[test]
fn test_missing_subcommand_fails() {
    let mut cmd = cargo::cargo_bin_cmd!("sitepulse");
    cmd.assert().failure();
}
