//! Hand-eye calibration data collection.
//!
//! The pieces:
//! - [`PatternCapture`]: camera-side capture of a calibration pattern, with
//!   [`GrabberCaptureAdapter`] bridging a device-level [`Grabber`],
//! - [`MotionRequester`]: random robot moves around the pattern,
//! - [`SolverClient`]: hand-off of the paired dataset to an AX=XB solver,
//! - [`PosePairCollector`]: the loop that drives all three.
//!
//! Pose types, the dataset and the run configuration live in `handeye-core`.

mod capture;
mod collector;
mod grabber;
mod motion;
mod publish;
mod service;
mod solver;

pub use capture::{capture_with_retries, CaptureError, CaptureOutcome, CaptureSession, PatternCapture};
pub use collector::{CollectError, CollectionStats, CollectorState, PosePairCollector};
pub use grabber::{
    CaptureParams, FrameCallback, Grabber, GrabberCaptureAdapter, GrabberError, PixelEncoding,
    StereoFrame,
};
pub use motion::{
    MotionRequester, MotionService, MoveRequest, MoveResponse, ServiceMotionRequester,
    MOTION_SERVICE_NAME,
};
pub use publish::{
    publish_stereo, FramePublisher, ImageHeader, ImageMessage, LogFramePublisher,
    NullFramePublisher, IMAGE_FRAME_ID, LEFT_CHANNEL, RIGHT_CHANNEL,
};
pub use service::ServiceError;
pub use solver::{
    RecordingSolverClient, ServiceSolverClient, SolverClient, SolverRequest, SolverResponse,
    SolverService, ROBOT_FRAME_ID, SOLVER_SERVICE_NAME,
};

pub use handeye_core::{CalibrationConfig, CalibrationResult, CapturePolicy, Pose3D, PoseSample, SampleSet};
