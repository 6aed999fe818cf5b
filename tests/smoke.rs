//! Smoke tests -- verify the binary runs and its subcommands are wired.

use assert_cmd::Command;

const FIXTURE: &str = "\
As of Date,Account,Primary Account,Secondary Account,AU,Balance Difference,Match Status
2024-01-01,1001,P1,S1,AU1,100,Match
2024-01-02,1001,P1,S1,AU1,100,Match
2024-01-03,1001,P1,S1,AU1,100,Match
2024-01-04,1001,P1,S1,AU1,100,Match
";

fn breakscope() -> Command {
    let mut cmd = Command::cargo_bin("breakscope").unwrap();
    cmd.env_remove("BREAKSCOPE_CONFIG");
    cmd
}

#[test]
fn test_cli_help() {
    breakscope()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Anomaly flagging"));
}

#[test]
fn test_cli_version() {
    breakscope()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("breakscope"));
}

#[test]
fn test_serve_subcommand_exists() {
    breakscope().args(["serve", "--help"]).assert().success();
}

#[test]
fn test_config_prints_defaults() {
    breakscope()
        .arg("config")
        .assert()
        .success()
        .stdout(predicates::str::contains("[server]"))
        .stdout(predicates::str::contains("history_policy = \"fill_zero\""));
}

#[test]
fn test_score_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("recon.csv");
    let output = dir.path().join("scored.csv");
    std::fs::write(&input, FIXTURE).unwrap();

    breakscope()
        .arg("score")
        .arg("--input")
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicates::str::contains("Scored 4 rows"));

    let scored = std::fs::read_to_string(&output).unwrap();
    let mut lines = scored.lines();
    assert_eq!(
        lines.next().unwrap(),
        "As of Date,Account,Primary Account,Secondary Account,AU,Balance Difference,Match Status,Predicted Anomaly,Comments"
    );
    assert!(lines.all(|l| l.ends_with(",No,")));
}

#[test]
fn test_score_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("recon.csv");
    std::fs::write(&input, FIXTURE).unwrap();

    breakscope()
        .arg("score")
        .arg("--input")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicates::str::contains("Predicted Anomaly,Comments"));
}

#[test]
fn test_score_rejects_missing_column() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.csv");
    std::fs::write(&input, "As of Date,Account\n2024-01-01,1001\n").unwrap();

    breakscope()
        .arg("score")
        .arg("--input")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicates::str::contains("missing required column"));
}

#[test]
fn test_explicit_config_must_exist() {
    breakscope()
        .args(["--config", "/nonexistent/breakscope.toml", "config"])
        .assert()
        .failure();
}
