use assert_cmd::Command;
use handeye::io::{RunConfig, RunReport};
use predicates::prelude::*;

fn handeye() -> Command {
    Command::cargo_bin("handeye").unwrap()
}

#[test]
fn init_config_writes_loadable_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handeye.json");

    handeye()
        .args(["init-config", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote default config"));

    let cfg = RunConfig::load_json(&path).unwrap();
    assert_eq!(cfg, RunConfig::default());
}

#[test]
fn run_writes_report_with_samples() {
    let dir = tempfile::tempdir().unwrap();
    let report_path = dir.path().join("report.json");

    handeye()
        .args([
            "run",
            "--samples",
            "4",
            "--seed",
            "3",
            "--no-delay",
            "--include-samples",
            "--report",
            report_path.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("hand-eye transform"))
        .stdout(predicate::str::contains("collected 4 of 4 pose pairs"));

    let report = RunReport::load_json(&report_path).unwrap();
    assert!(report.is_success());
    assert_eq!(report.samples.map(|s| s.len()), Some(4));
}

#[test]
fn infeasible_robot_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg_path = dir.path().join("cfg.json");
    let report_path = dir.path().join("report.json");

    let mut cfg = RunConfig::default();
    cfg.calibration.target_sample_count = 3;
    cfg.sim.seed = Some(1);
    cfg.sim.infeasible_probability = 1.0;
    cfg.report_path = Some(report_path.to_string_lossy().into_owned());
    cfg.write_json(&cfg_path).unwrap();

    handeye()
        .args(["run", "--no-delay", "--config", cfg_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("calibration failed"));

    let report = RunReport::load_json(&report_path).unwrap();
    assert!(report.result.is_none());
    assert_eq!(
        report.config_path.as_deref(),
        Some(cfg_path.to_string_lossy().as_ref())
    );
}

#[test]
fn missing_config_is_an_error() {
    handeye()
        .args(["run", "--config", "/nonexistent/handeye.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
