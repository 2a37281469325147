use std::f64::consts::TAU;

use handeye_collect::{MotionService, MoveRequest, MoveResponse, ServiceError};
use handeye_core::Pose3D;
use log::debug;
use nalgebra::{Isometry3, Point3, Vector3};
use rand::rngs::StdRng;
use rand::Rng;

use super::{lock, SharedWorld, SimParams};

/// Random-move service of the simulated robot.
///
/// Picks a camera position on a spherical cap in front of the requested
/// pattern pose, points the camera at it and moves the end effector there.
pub struct SimRobot {
    world: SharedWorld,
    rng: StdRng,
    max_tilt: f64,
    radius_span: f64,
    infeasible_probability: f64,
    moves: usize,
}

impl SimRobot {
    pub fn new(world: SharedWorld, params: &SimParams, rng: StdRng) -> Self {
        Self {
            world,
            rng,
            max_tilt: params.max_tilt_deg.to_radians(),
            radius_span: params.radius_span,
            infeasible_probability: params.infeasible_probability,
            moves: 0,
        }
    }

    /// Move requests served so far.
    pub fn moves(&self) -> usize {
        self.moves
    }

    fn sample_camera_pose(&mut self, target: &Pose3D, min_radius: f64) -> Pose3D {
        let tilt = self.rng.random_range(0.0..=self.max_tilt);
        let azimuth = self.rng.random_range(0.0..TAU);
        let radius = min_radius + self.rng.random_range(0.0..=self.radius_span);

        let local = Vector3::new(
            tilt.sin() * azimuth.cos(),
            tilt.sin() * azimuth.sin(),
            tilt.cos(),
        );
        let direction = target.rotation() * local;
        // Looking straight along world z leaves roll undefined; fix it with y.
        let up = if direction.cross(&Vector3::z()).norm() < 1e-6 {
            Vector3::y()
        } else {
            Vector3::z()
        };

        let center = Point3::from(target.translation());
        let eye = center + direction * radius;
        Pose3D::from_isometry(Isometry3::face_towards(&eye, &center, &up))
    }
}

impl MotionService for SimRobot {
    fn wait_until_ready(&mut self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn call(&mut self, request: &MoveRequest) -> Result<MoveResponse, ServiceError> {
        self.moves += 1;
        if request.go_to_init_pose {
            debug!("passing through the init pose");
        }
        if self.rng.random_bool(self.infeasible_probability) {
            return Ok(MoveResponse::infeasible());
        }
        let camera = self.sample_camera_pose(&request.pattern_pose, request.min_radius);

        let mut world = lock(&self.world);
        world.robot = camera * world.hand_eye.inverse();
        Ok(MoveResponse::reached(world.robot))
    }
}
