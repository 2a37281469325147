//! Simulated rig: a robot carrying a stereo head in front of a fixed pattern.
//!
//! All three capabilities share one [`SimWorld`] holding the ground truth
//! (hand-eye transform, pattern pose) and the current robot pose, so the
//! collector can be exercised end to end without hardware. The simulated
//! solver does not solve AX=XB; it verifies that every pair is consistent with
//! the ground truth and returns the known transform.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use handeye_collect::{
    CalibrationResult, CollectError, GrabberCaptureAdapter, GrabberError, LogFramePublisher,
    PosePairCollector, RecordingSolverClient, ServiceMotionRequester, ServiceSolverClient,
};
use handeye_core::{ConfigError, Pose3D, SampleSet};
use nalgebra::{UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

mod grabber;
mod robot;
mod solver;

pub use grabber::SimGrabber;
pub use robot::SimRobot;
pub use solver::SimSolver;

use crate::io::{RunConfig, RunReport};

#[derive(thiserror::Error, Debug)]
pub enum SimError {
    #[error("invalid simulation parameter {name} (got {value})")]
    InvalidParam { name: &'static str, value: f64 },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not open simulated device: {0}")]
    Grabber(#[from] GrabberError),
}

/// Knobs of the simulated rig.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// RNG seed; a random one is drawn when absent.
    pub seed: Option<u64>,
    /// Ground-truth camera pose in the end-effector frame.
    pub hand_eye: Pose3D,
    /// Where the real pattern sits relative to the configured prior (prior frame, metres).
    pub pattern_offset: [f64; 3],
    /// Chance that one capture attempt detects the pattern.
    pub detection_probability: f64,
    /// Chance that the robot reports no reachable pose.
    pub infeasible_probability: f64,
    /// Uniform translation noise on each observation (metres).
    pub translation_noise: f64,
    /// Uniform rotation noise on each observation (degrees).
    pub rotation_noise_deg: f64,
    /// Maximum angle between the viewing direction and the pattern normal.
    pub max_tilt_deg: f64,
    /// Move radii are drawn from `[min_radius, min_radius + radius_span]`.
    pub radius_span: f64,
    pub frame_interval_ms: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Largest pair residual (metres and radians) the solver accepts.
    pub consistency_tol: f64,
}

impl Default for SimParams {
    fn default() -> Self {
        let rotation = UnitQuaternion::from_euler_angles(0.02, -0.03, std::f64::consts::FRAC_PI_2);
        Self {
            seed: None,
            hand_eye: Pose3D::from_parts(Vector3::new(0.03, -0.01, 0.12), rotation),
            pattern_offset: [0.01, -0.02, 0.0],
            detection_probability: 0.8,
            infeasible_probability: 0.0,
            translation_noise: 0.0,
            rotation_noise_deg: 0.0,
            max_tilt_deg: 35.0,
            radius_span: 0.3,
            frame_interval_ms: 40,
            frame_width: 64,
            frame_height: 48,
            consistency_tol: 1e-3,
        }
    }
}

impl SimParams {
    pub fn validate(&self) -> Result<(), SimError> {
        for (name, value) in [
            ("detection_probability", self.detection_probability),
            ("infeasible_probability", self.infeasible_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::InvalidParam { name, value });
            }
        }
        for (name, value) in [
            ("translation_noise", self.translation_noise),
            ("rotation_noise_deg", self.rotation_noise_deg),
            ("radius_span", self.radius_span),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::InvalidParam { name, value });
            }
        }
        if !(0.0..80.0).contains(&self.max_tilt_deg) {
            return Err(SimError::InvalidParam {
                name: "max_tilt_deg",
                value: self.max_tilt_deg,
            });
        }
        if !self.consistency_tol.is_finite() || self.consistency_tol <= 0.0 {
            return Err(SimError::InvalidParam {
                name: "consistency_tol",
                value: self.consistency_tol,
            });
        }
        Ok(())
    }
}

/// Ground truth plus the current robot pose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimWorld {
    /// Camera in the end-effector frame.
    pub hand_eye: Pose3D,
    /// Pattern in the robot base frame.
    pub pattern: Pose3D,
    /// End-effector in the robot base frame.
    pub robot: Pose3D,
}

impl SimWorld {
    pub fn new(hand_eye: Pose3D, pattern: Pose3D) -> Self {
        Self {
            hand_eye,
            pattern,
            robot: Pose3D::identity(),
        }
    }

    /// Camera in the robot base frame.
    pub fn camera(&self) -> Pose3D {
        self.robot * self.hand_eye
    }

    /// Pattern in the camera frame, as a perfect detector would report it.
    pub fn pattern_in_camera(&self) -> Pose3D {
        self.camera().inverse() * self.pattern
    }
}

pub type SharedWorld = Arc<Mutex<SimWorld>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub type SimCapture = GrabberCaptureAdapter<SimGrabber>;
pub type SimMotion = ServiceMotionRequester<SimRobot>;
pub type SimSolverClient = RecordingSolverClient<ServiceSolverClient<SimSolver>>;
pub type SimCollector = PosePairCollector<SimCapture, SimMotion, SimSolverClient>;

/// A collector wired to a simulated grabber, robot and solver.
pub struct SimRig {
    world: SharedWorld,
    collector: SimCollector,
    frames: Arc<AtomicU64>,
}

impl SimRig {
    /// Build the world, open the simulated device and assemble the collector.
    pub fn new(cfg: &RunConfig) -> Result<Self, SimError> {
        cfg.sim.validate()?;
        cfg.calibration.validate()?;

        let mut seeder = match cfg.sim.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let robot_rng = StdRng::seed_from_u64(seeder.random());
        let camera_rng = StdRng::seed_from_u64(seeder.random());

        let [dx, dy, dz] = cfg.sim.pattern_offset;
        let offset = Pose3D::from_parts(Vector3::new(dx, dy, dz), UnitQuaternion::identity());
        let pattern = cfg.calibration.estimated_pattern_pose * offset;
        let world = Arc::new(Mutex::new(SimWorld::new(cfg.sim.hand_eye, pattern)));

        let publisher = LogFramePublisher::new();
        let frames = publisher.counter();
        let grabber = SimGrabber::new(Arc::clone(&world), &cfg.sim, camera_rng);
        let capture = GrabberCaptureAdapter::open(grabber, &cfg.device_id, &cfg.capture, publisher)?;

        let motion = ServiceMotionRequester::new(SimRobot::new(Arc::clone(&world), &cfg.sim, robot_rng))
            .with_go_to_init_pose(cfg.calibration.go_to_init_pose);
        let solver = RecordingSolverClient::new(ServiceSolverClient::new(SimSolver::new(
            Arc::clone(&world),
            cfg.sim.consistency_tol,
        )));

        let collector = PosePairCollector::new(cfg.calibration.clone(), capture, motion, solver)?;
        Ok(Self {
            world,
            collector,
            frames,
        })
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.collector = self.collector.with_cancel_flag(flag);
        self
    }

    pub fn collector(&self) -> &SimCollector {
        &self.collector
    }

    /// The hand-eye transform the solver should recover.
    pub fn ground_truth(&self) -> Pose3D {
        lock(&self.world).hand_eye
    }

    /// Images republished by the simulated device so far.
    pub fn frames_published(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn run(&mut self) -> Result<CalibrationResult, CollectError> {
        self.collector.run()
    }

    /// Samples handed to the solver, or those collected so far if it was never called.
    pub fn samples(&self) -> SampleSet {
        self.collector
            .solver()
            .last_request()
            .cloned()
            .unwrap_or_else(|| self.collector.samples().clone())
    }
}

/// Run a full simulated collection and summarize it as a [`RunReport`].
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(cfg, config_path, cancel),
        fields(device = %cfg.device_id, target = cfg.calibration.target_sample_count)
    )
)]
pub fn simulate(
    cfg: &RunConfig,
    config_path: Option<&std::path::Path>,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<RunReport, SimError> {
    let mut rig = SimRig::new(cfg)?;
    if let Some(flag) = cancel {
        rig = rig.with_cancel_flag(flag);
    }

    let mut report = RunReport::new(cfg, config_path);
    match rig.run() {
        Ok(result) => report.set_result(result),
        Err(err) => report.set_error(&err),
    }
    report.stats = *rig.collector().stats();
    report.ground_truth = Some(rig.ground_truth());
    if cfg.include_samples {
        report.samples = Some(rig.samples());
    }
    log::debug!("{} images republished", rig.frames_published());
    Ok(report)
}
