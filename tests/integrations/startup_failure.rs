use assert_cmd::Command;
use predicates::prelude::*;
use std::time::Duration;

#[test]
fn test_unreachable_broker_aborts_startup() {
    let workdir = tempfile::tempdir().unwrap();

    Command::cargo_bin("fleetwatch")
        .unwrap()
        .current_dir(workdir.path())
        .env_clear()
        .env("RUST_LOG", "info")
        .env("FLEETWATCH_QUEUE__HOST", "127.0.0.1")
        .env("FLEETWATCH_QUEUE__PORT", "1")
        .env("FLEETWATCH_QUEUE__CONNECT_ATTEMPTS", "2")
        .env("FLEETWATCH_QUEUE__RETRY_INTERVAL_MS", "10")
        .env("FLEETWATCH_SMTP__RECIPIENT", "ops@example.com")
        .env("FLEETWATCH_SERVER__LISTEN_ADDRESS", "127.0.0.1:0")
        .timeout(Duration::from_secs(30))
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "could not connect to message broker",
        ));
}

#[test]
fn test_invalid_configuration_aborts_startup() {
    let workdir = tempfile::tempdir().unwrap();

    Command::cargo_bin("fleetwatch")
        .unwrap()
        .current_dir(workdir.path())
        .env_clear()
        .env("FLEETWATCH_DISPATCH__CONCURRENCY_LIMIT", "0")
        .env("FLEETWATCH_SMTP__RECIPIENT", "ops@example.com")
        .assert()
        .failure()
        .stderr(predicate::str::contains("dispatch.concurrency_limit"));
}
