use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use handeye::io::{RunConfig, RunReport};
use handeye::sim::{simulate, SimError, SimRig};
use handeye::{CollectorState, Pose3D};

fn config(samples: usize, seed: u64) -> RunConfig {
    let mut cfg = RunConfig::default();
    cfg.calibration = cfg.calibration.without_delays();
    cfg.calibration.target_sample_count = samples;
    cfg.sim.seed = Some(seed);
    cfg.sim.frame_interval_ms = 5;
    cfg
}

fn assert_consistent(report: &RunReport, truth: &Pose3D) {
    let result = report.result.expect("solver was called");
    assert!(result.is_success(), "error: {:?}", report.error);
    let transform = result.transform().unwrap();
    assert!(transform.translation_distance(truth) < 1e-9);
    assert!(transform.rotation_angle_to(truth) < 1e-9);
}

#[test]
fn simulated_run_recovers_the_ground_truth() {
    let mut cfg = config(8, 1);
    cfg.include_samples = true;
    let report = simulate(&cfg, None, None).unwrap();

    let truth = report.ground_truth.unwrap();
    assert_eq!(truth, cfg.sim.hand_eye);
    assert_consistent(&report, &truth);
    assert_eq!(report.samples.as_ref().map(|s| s.len()), Some(8));
    assert_eq!(report.stats.samples_collected, 8);
    assert!(report.error.is_none());
}

#[test]
fn capture_misses_are_counted_and_retried() {
    let mut cfg = config(5, 5);
    cfg.sim.detection_probability = 0.3;
    let report = simulate(&cfg, None, None).unwrap();

    assert_consistent(&report, &cfg.sim.hand_eye);
    let stats = report.stats;
    assert_eq!(stats.samples_collected, 5);
    assert_eq!(
        stats.iterations,
        stats.samples_collected + stats.discarded_iterations
    );
    assert_eq!(stats.motion_requests, stats.iterations);
}

#[test]
fn noisy_observations_within_tolerance_still_solve() {
    let mut cfg = config(6, 9);
    cfg.sim.translation_noise = 1e-4;
    cfg.sim.rotation_noise_deg = 0.005;
    cfg.sim.consistency_tol = 5e-3;
    let report = simulate(&cfg, None, None).unwrap();
    assert!(report.is_success(), "error: {:?}", report.error);
}

#[test]
fn unreachable_poses_abort_without_solving() {
    let mut cfg = config(5, 2);
    cfg.sim.infeasible_probability = 1.0;
    let mut rig = SimRig::new(&cfg).unwrap();
    assert!(rig.run().is_err());

    let collector = rig.collector();
    assert_eq!(collector.state(), CollectorState::Aborted);
    assert_eq!(collector.stats().motion_requests, 1);
    assert!(collector.solver().last_request().is_none());
    assert_eq!(collector.solver().inner().service().calls(), 0);

    let report = simulate(&cfg, None, None).unwrap();
    assert!(report.result.is_none());
    assert!(report.error.unwrap().contains("no reachable pose"));
}

#[test]
fn cancelled_run_reports_the_cancellation() {
    let cfg = config(5, 3);
    let report = simulate(&cfg, None, Some(Arc::new(AtomicBool::new(true)))).unwrap();
    assert!(!report.is_success());
    assert!(report.error.unwrap().contains("cancelled"));
    assert_eq!(report.stats.iterations, 0);
}

#[test]
fn too_small_dataset_is_rejected_by_the_solver() {
    let report = simulate(&config(2, 4), None, None).unwrap();
    let result = report.result.unwrap();
    assert!(!result.is_success());
    assert!(result.transform().is_none());
}

#[test]
fn same_seed_gives_same_dataset() {
    let mut cfg = config(4, 11);
    cfg.include_samples = true;
    let a = simulate(&cfg, None, None).unwrap();
    let b = simulate(&cfg, None, None).unwrap();
    assert_eq!(a.samples, b.samples);
    assert_eq!(a.stats, b.stats);
}

#[test]
fn invalid_sim_params_are_rejected() {
    let mut cfg = config(4, 1);
    cfg.sim.max_tilt_deg = 95.0;
    assert!(matches!(
        SimRig::new(&cfg),
        Err(SimError::InvalidParam {
            name: "max_tilt_deg",
            ..
        })
    ));
}

#[test]
fn report_round_trips_through_json() {
    let mut cfg = config(3, 6);
    cfg.include_samples = true;
    let report = simulate(&cfg, None, None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.write_json(&path).unwrap();
    let loaded = RunReport::load_json(&path).unwrap();

    assert_eq!(loaded.stats, report.stats);
    assert_eq!(loaded.samples, report.samples);
    assert_eq!(loaded.device_id, "150534");
    let (a, b) = (
        loaded.result.unwrap().transform().copied().unwrap(),
        report.result.unwrap().transform().copied().unwrap(),
    );
    assert!(a.translation_distance(&b) < 1e-12);
}

#[test]
fn config_round_trips_through_json() {
    let mut cfg = config(7, 8);
    cfg.sim.detection_probability = 0.5;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    cfg.write_json(&path).unwrap();
    let loaded = RunConfig::load_json(&path).unwrap();
    assert_eq!(loaded.calibration.target_sample_count, 7);
    assert_eq!(loaded.sim.seed, Some(8));
    assert_eq!(loaded.sim.detection_probability, 0.5);
    assert_eq!(loaded.capture, cfg.capture);
}
