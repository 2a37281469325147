//! Random robot moves around the calibration pattern.

use handeye_core::Pose3D;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::service::ServiceError;

/// Default name of the random-move service.
pub const MOTION_SERVICE_NAME: &str = "calibration_move_random";

/// Ask the robot to move to a random pose that keeps the pattern in view.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Prior for the pattern pose in the robot frame; the camera is aimed at it.
    pub pattern_pose: Pose3D,
    /// Minimum distance from the pattern.
    pub min_radius: f64,
    pub go_to_init_pose: bool,
}

/// Outcome of a move. `success == false` means no reachable pose was found.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveResponse {
    pub success: bool,
    /// Achieved end-effector pose in the robot base frame.
    pub robot_pose: Pose3D,
}

impl MoveResponse {
    pub fn reached(robot_pose: Pose3D) -> Self {
        Self {
            success: true,
            robot_pose,
        }
    }

    pub fn infeasible() -> Self {
        Self {
            success: false,
            robot_pose: Pose3D::identity(),
        }
    }
}

/// Blocking RPC endpoint that executes random moves.
pub trait MotionService {
    fn name(&self) -> &str {
        MOTION_SERVICE_NAME
    }

    /// Block until the service is available.
    fn wait_until_ready(&mut self) -> Result<(), ServiceError>;

    fn call(&mut self, request: &MoveRequest) -> Result<MoveResponse, ServiceError>;
}

/// What the collection loop needs from the robot side.
///
/// `Err` is a hard failure (no answer); a soft failure is `Ok` with
/// `success == false`.
pub trait MotionRequester {
    fn request_random_move(
        &mut self,
        pattern_pose: &Pose3D,
        min_radius: f64,
    ) -> Result<MoveResponse, ServiceError>;
}

impl<M: MotionRequester + ?Sized> MotionRequester for &mut M {
    fn request_random_move(
        &mut self,
        pattern_pose: &Pose3D,
        min_radius: f64,
    ) -> Result<MoveResponse, ServiceError> {
        (**self).request_random_move(pattern_pose, min_radius)
    }
}

/// [`MotionRequester`] backed by a [`MotionService`].
///
/// Waits for the service once, on the first request.
pub struct ServiceMotionRequester<S> {
    service: S,
    go_to_init_pose: bool,
    ready: bool,
}

impl<S: MotionService> ServiceMotionRequester<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            go_to_init_pose: false,
            ready: false,
        }
    }

    pub fn with_go_to_init_pose(mut self, go_to_init_pose: bool) -> Self {
        self.go_to_init_pose = go_to_init_pose;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn into_inner(self) -> S {
        self.service
    }

    fn ensure_ready(&mut self) -> Result<(), ServiceError> {
        if !self.ready {
            info!("waiting for motion service `{}`", self.service.name());
            self.service.wait_until_ready()?;
            self.ready = true;
        }
        Ok(())
    }
}

impl<S: MotionService> MotionRequester for ServiceMotionRequester<S> {
    fn request_random_move(
        &mut self,
        pattern_pose: &Pose3D,
        min_radius: f64,
    ) -> Result<MoveResponse, ServiceError> {
        self.ensure_ready()?;
        let request = MoveRequest {
            pattern_pose: *pattern_pose,
            min_radius,
            go_to_init_pose: self.go_to_init_pose,
        };
        let response = self.service.call(&request)?;
        debug!(
            "move request (min radius {min_radius}): success={} robot pose {}",
            response.success, response.robot_pose
        );
        Ok(response)
    }
}
