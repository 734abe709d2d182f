use assert_cmd::prelude::*;
use predicates::prelude::*;

use std::path::PathBuf;
use std::process::Command;

fn test_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("resources/test_config.toml")
}

#[test]
fn test_cli() {
    let mut cmd = Command::cargo_bin("queuesim").expect("Calling binary failed");
    cmd.assert().failure();
}

#[test]
fn test_version() {
    let expected_version = "queuesim 0.1.0\n";
    let mut cmd = Command::cargo_bin("queuesim").expect("Calling binary failed");
    cmd.arg("--version").assert().stdout(expected_version);
}

#[test]
fn test_subcommand_version() {
    let expected = "argument '--version' which wasn't expected";

    let mut cmd = Command::cargo_bin("queuesim").expect("Calling binary failed");
    cmd.arg("config")
        .arg("--version")
        .assert()
        .stderr(predicate::str::contains(expected));
}

#[test]
fn test_config_dump() {
    let mut cmd = Command::cargo_bin("queuesim").expect("Calling binary failed");
    let out = cmd
        .arg("-c")
        .arg(test_config())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("size: 12"))
        .get_output()
        .stdout
        .clone();

    // logs moved to stderr, stdout is YAML only
    let cfg: queuesim::SimConfig = serde_yaml::from_slice(&out).expect("stdout is not a config");
    assert_eq!(cfg.seed.as_deref(), Some("test seed"));
}

#[test]
fn test_preset() {
    let mut cmd = Command::cargo_bin("queuesim").expect("Calling binary failed");
    cmd.args(&["--preset", "waterfall", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("type: Waterfall"));

    let mut cmd = Command::cargo_bin("queuesim").expect("Calling binary failed");
    cmd.args(&["--preset", "nope", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown preset"));
}

#[test]
fn test_presets_listing() {
    let mut cmd = Command::cargo_bin("queuesim").expect("Calling binary failed");
    cmd.arg("presets")
        .assert()
        .success()
        .stdout("blocking\nmm1\nmmc\nwaterfall\n");
}

#[test]
fn test_run_writes_tables() {
    let out = std::env::temp_dir().join(format!("queuesim-cli-{}", std::process::id()));

    let mut cmd = Command::cargo_bin("queuesim").expect("Calling binary failed");
    cmd.env("QUEUESIM_OUTPUT_DIR", &out)
        .arg("-c")
        .arg(test_config())
        .arg("run")
        .assert()
        .success();

    for file in &["stage_agents.csv", "stage_timeline.csv", "stage_stats.csv", "stage_trace.json"] {
        assert!(out.join(file).exists(), "{} missing", file);
    }
}
