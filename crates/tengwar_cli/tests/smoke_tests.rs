//! CLI smoke tests: verify basic binary behavior.

use std::process::Command;

fn cli_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tengwar"))
}

#[test]
fn test_help_flag() {
    let output = cli_bin().arg("--help").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage"), "Expected usage info in --help output");
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("chat"));
}

#[test]
fn test_version_flag() {
    let output = cli_bin().arg("--version").output().expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tengwar"), "Expected binary name in --version output");
}

#[test]
fn test_missing_config_does_not_panic() {
    let output = cli_bin()
        .arg("--config")
        .arg("/tmp/nonexistent_tengwar_config_12345.toml")
        .arg("--help")
        .output()
        .expect("failed to run");
    assert!(output.status.success());
}

#[test]
fn test_thoughts_on_fresh_store() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("fresh.db");
    let output = cli_bin()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("--db")
        .arg(&db)
        .args(["thoughts", "--limit", "5"])
        .env_remove("TENGWAR_DB_PATH")
        .output()
        .expect("failed to run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("(no thoughts yet)"));
}
