//! End-to-end tests of the `agentage` binary. No API server is needed.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn agentage(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("agentage").unwrap();
    cmd.env("AGENTAGE_CONFIG_DIR", config_dir.path())
        .env("RUST_LOG", "info")
        .env_remove("AGENTAGE_API_URL");
    cmd
}

fn write_credentials(config_dir: &TempDir) -> std::path::PathBuf {
    let path = config_dir.path().join("credentials.json");
    let body = serde_json::json!({
        "api_url": "http://127.0.0.1:9",
        "access_token": "a.b.c",
        "user": { "id": "u1", "email": "dev@x.com" },
    });
    std::fs::write(&path, body.to_string()).unwrap();
    path
}

#[test]
fn version_prints_package_version() {
    let dir = TempDir::new().unwrap();
    agentage(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    agentage(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("login")
                .and(predicate::str::contains("whoami"))
                .and(predicate::str::contains("logout")),
        );
}

#[test]
fn whoami_without_credentials_fails() {
    let dir = TempDir::new().unwrap();
    agentage(&dir)
        .arg("whoami")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Not logged in"));
}

#[test]
fn logout_without_credentials_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    agentage(&dir)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in."));
}

#[test]
fn logout_removes_stored_credentials() {
    let dir = TempDir::new().unwrap();
    let path = write_credentials(&dir);

    agentage(&dir)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out."));
    assert!(!path.exists());
}

#[test]
fn login_against_unreachable_api_fails_without_writing_credentials() {
    let dir = TempDir::new().unwrap();
    agentage(&dir)
        .args(["--api-url", "http://127.0.0.1:9", "login"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("error"));
    assert!(!dir.path().join("credentials.json").exists());
}

#[test]
fn whoami_with_unreachable_api_fails() {
    let dir = TempDir::new().unwrap();
    write_credentials(&dir);
    agentage(&dir).arg("whoami").assert().failure();
}
