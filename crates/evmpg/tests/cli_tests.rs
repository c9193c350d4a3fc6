use assert_cmd::Command;
use predicates::prelude::*;
use tracing::info;

/// PUSH1 42 PUSH1 00 MSTORE PUSH1 20 PUSH1 00 RETURN
const RETURN_42: &str = "604260005260206000f3";

fn evmpg() -> Command {
    let mut cmd = Command::cargo_bin("evmpg").unwrap();
    cmd.env("EVMPG_CONFIG", std::env::temp_dir().join("evmpg-cli-tests-missing.toml"))
        .env_remove("EVMPG_FORK");
    cmd
}

#[test]
fn test_help_command() {
    evmpg_common::logging::ensure_test_logging(None);
    info!("Testing CLI help command");

    evmpg().arg("--help").assert().success().stdout(predicate::str::contains("EVM Playground"));
}

#[test]
fn test_version_command() {
    evmpg_common::logging::ensure_test_logging(None);
    info!("Running test");
    evmpg().arg("--version").assert().success().stdout(predicate::str::contains("evmpg"));
}

#[test]
fn test_missing_bytecode() {
    evmpg_common::logging::ensure_test_logging(None);
    info!("Running test");
    evmpg().assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_unknown_fork() {
    evmpg_common::logging::ensure_test_logging(None);
    info!("Running test");
    evmpg()
        .args(["--fork", "atlantis", RETURN_42])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown hardfork"));
}

#[test]
fn test_invalid_bytecode() {
    evmpg_common::logging::ensure_test_logging(None);
    info!("Running test");
    evmpg().args(["--batch", "60zz"]).assert().failure().stderr(predicate::str::contains("hex"));
}

#[test]
fn test_batch_run() {
    evmpg_common::logging::ensure_test_logging(None);
    info!("Running test");
    evmpg()
        .args(["--batch", RETURN_42])
        .assert()
        .success()
        .stdout(predicate::str::contains("Execution finished"))
        .stdout(predicate::str::contains(
            "Returned 0x0000000000000000000000000000000000000000000000000000000000000042",
        ));
}

#[test]
fn test_batch_deploy() {
    evmpg_common::logging::ensure_test_logging(None);
    info!("Running test");
    let init = format!("600a600c600039600a6000f3{RETURN_42}");
    evmpg()
        .args(["--batch", "--deploy", &init])
        .assert()
        .success()
        .stdout(predicate::str::contains("Contract at 0x"));
}

#[test]
fn test_interactive_stepping() {
    evmpg_common::logging::ensure_test_logging(None);
    info!("Running test");
    evmpg()
        .arg(RETURN_42)
        .write_stdin("step\nbreak 7\ncontinue\nstate\ncontinue\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("-> 0000: PUSH1 0x42"))
        .stdout(predicate::str::contains("-> 0002: PUSH1 0x00"))
        .stdout(predicate::str::contains("Breakpoint set at 0x0007"))
        .stdout(predicate::str::contains("-> 0007: PUSH1 0x00"))
        .stdout(predicate::str::contains("memory: 1 words"))
        .stdout(predicate::str::contains("Execution finished"));
}

#[test]
fn test_interactive_errors_do_not_exit() {
    evmpg_common::logging::ensure_test_logging(None);
    info!("Running test");
    evmpg()
        .arg("00")
        .write_stdin("jump 3\nfinish\ncall\nfork\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("unknown command `jump`"))
        .stdout(predicate::str::contains("no contract has been deployed"))
        .stdout(predicate::str::contains("* Prague"));
}

#[test]
fn test_save_config() {
    evmpg_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evmpg").join("config.toml");

    evmpg()
        .env("EVMPG_CONFIG", &path)
        .args(["--fork", "berlin", "--save-config", "--batch", "00"])
        .assert()
        .success();
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("fork = \"Berlin\""));

    // an explicit file is read back and rewritten in place
    evmpg()
        .args(["--config", path.to_str().unwrap(), "--fork", "shanghai", "--save-config"])
        .args(["--batch", "00"])
        .assert()
        .success();
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("fork = \"Shanghai\""));
}
