//! Hand-off of the collected dataset to the AX=XB solver.

use handeye_core::{CalibrationResult, Pose3D, SampleSet};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::service::ServiceError;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Default name of the solver service.
pub const SOLVER_SERVICE_NAME: &str = "AXXBsolver";
/// Frame label attached to both pose arrays of a solve request.
pub const ROBOT_FRAME_ID: &str = "/robot";

/// Index-aligned pose arrays sent to the solver.
///
/// Only constructible from a [`SampleSet`], so `robot_poses[i]` and
/// `pattern_poses[i]` always come from the same sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverRequest {
    frame_id: String,
    robot_poses: Vec<Pose3D>,
    pattern_poses: Vec<Pose3D>,
}

impl SolverRequest {
    pub fn from_samples(samples: &SampleSet) -> Self {
        Self {
            frame_id: ROBOT_FRAME_ID.to_string(),
            robot_poses: samples.robot_poses(),
            pattern_poses: samples.pattern_poses(),
        }
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn robot_poses(&self) -> &[Pose3D] {
        &self.robot_poses
    }

    pub fn pattern_poses(&self) -> &[Pose3D] {
        &self.pattern_poses
    }

    pub fn len(&self) -> usize {
        self.robot_poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robot_poses.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverResponse {
    /// Camera pose in the end-effector frame.
    pub transform: Pose3D,
}

/// Blocking RPC endpoint of the solver.
pub trait SolverService {
    fn name(&self) -> &str {
        SOLVER_SERVICE_NAME
    }

    fn wait_until_ready(&mut self) -> Result<(), ServiceError>;

    fn call(&mut self, request: &SolverRequest) -> Result<SolverResponse, ServiceError>;
}

/// What the collection loop needs from the solver side.
///
/// Never fails: any call failure becomes an unsuccessful [`CalibrationResult`].
pub trait SolverClient {
    fn solve(&mut self, samples: &SampleSet) -> CalibrationResult;
}

impl<S: SolverClient + ?Sized> SolverClient for &mut S {
    fn solve(&mut self, samples: &SampleSet) -> CalibrationResult {
        (**self).solve(samples)
    }
}

/// [`SolverClient`] backed by a [`SolverService`]; waits for it once.
pub struct ServiceSolverClient<S> {
    service: S,
    ready: bool,
}

impl<S: SolverService> ServiceSolverClient<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            ready: false,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn into_inner(self) -> S {
        self.service
    }

    fn call(&mut self, samples: &SampleSet) -> Result<SolverResponse, ServiceError> {
        if !self.ready {
            info!("waiting for solver service `{}`", self.service.name());
            self.service.wait_until_ready()?;
            self.ready = true;
        }
        self.service.call(&SolverRequest::from_samples(samples))
    }
}

impl<S: SolverService> SolverClient for ServiceSolverClient<S> {
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, samples), fields(samples = samples.len())))]
    fn solve(&mut self, samples: &SampleSet) -> CalibrationResult {
        match self.call(samples) {
            Ok(response) => {
                let t = response.transform.translation();
                let q = response.transform.rotation();
                info!(
                    "hand-eye transform: translation [{:.6}, {:.6}, {:.6}], rotation (x y z w) [{:.6}, {:.6}, {:.6}, {:.6}]",
                    t.x, t.y, t.z, q.i, q.j, q.k, q.w
                );
                CalibrationResult::solved(response.transform)
            }
            Err(err) => {
                error!("solver call failed: {err}");
                CalibrationResult::failed()
            }
        }
    }
}

/// Wraps a [`SolverClient`] and keeps a copy of the last dataset it was given.
///
/// The collector discards its samples after solving; this keeps them around
/// for reporting.
pub struct RecordingSolverClient<S> {
    inner: S,
    last_request: Option<SampleSet>,
}

impl<S: SolverClient> RecordingSolverClient<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            last_request: None,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Samples passed to the last `solve` call.
    pub fn last_request(&self) -> Option<&SampleSet> {
        self.last_request.as_ref()
    }

    pub fn take_last_request(&mut self) -> Option<SampleSet> {
        self.last_request.take()
    }
}

impl<S: SolverClient> SolverClient for RecordingSolverClient<S> {
    fn solve(&mut self, samples: &SampleSet) -> CalibrationResult {
        self.last_request = Some(samples.clone());
        self.inner.solve(samples)
    }
}
