use handeye_collect::{ServiceError, SolverRequest, SolverResponse, SolverService, ROBOT_FRAME_ID};
use log::debug;

use super::{lock, SharedWorld};

/// Fewest pose pairs that give the two relative motions AX=XB needs.
pub const MIN_SOLVER_SAMPLES: usize = 3;

/// Solver service of the simulated rig.
///
/// Each pair must reproduce the true pattern pose through
/// `robot * hand_eye * pattern_in_camera`; a dataset that does gets the known
/// hand-eye transform back, anything else is rejected.
pub struct SimSolver {
    world: SharedWorld,
    tolerance: f64,
    calls: usize,
}

impl SimSolver {
    pub fn new(world: SharedWorld, tolerance: f64) -> Self {
        Self {
            world,
            tolerance,
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl SolverService for SimSolver {
    fn wait_until_ready(&mut self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn call(&mut self, request: &SolverRequest) -> Result<SolverResponse, ServiceError> {
        self.calls += 1;
        if request.frame_id() != ROBOT_FRAME_ID {
            return Err(ServiceError::rejected(
                self.name(),
                format!("unexpected frame `{}`", request.frame_id()),
            ));
        }
        if request.len() < MIN_SOLVER_SAMPLES {
            return Err(ServiceError::rejected(
                self.name(),
                format!(
                    "need at least {MIN_SOLVER_SAMPLES} pose pairs, got {}",
                    request.len()
                ),
            ));
        }

        let (hand_eye, pattern) = {
            let world = lock(&self.world);
            (world.hand_eye, world.pattern)
        };
        let mut worst = 0.0_f64;
        for (i, (robot, observed)) in request
            .robot_poses()
            .iter()
            .zip(request.pattern_poses())
            .enumerate()
        {
            let predicted = *robot * hand_eye * *observed;
            let dt = predicted.translation_distance(&pattern);
            let dr = predicted.rotation_angle_to(&pattern);
            if dt > self.tolerance || dr > self.tolerance {
                return Err(ServiceError::rejected(
                    self.name(),
                    format!("pair {i} is inconsistent ({dt:.4} m, {dr:.4} rad)"),
                ));
            }
            worst = worst.max(dt).max(dr);
        }

        debug!(
            "{} pose pairs consistent (worst residual {worst:.2e})",
            request.len()
        );
        Ok(SolverResponse {
            transform: hand_eye,
        })
    }
}
