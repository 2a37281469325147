//! Core types for hand-eye calibration data collection.
//!
//! This crate is intentionally small and purely descriptive: rigid poses, the
//! paired dataset a collection run produces, the run configuration and the
//! final result. It does *not* know about cameras, robots or solvers.

mod config;
mod logger;
mod pose;
mod result;
mod sample;

pub use config::{CalibrationConfig, CapturePolicy, ConfigError};
pub use pose::{Pose3D, PoseError, ROTATION_TOLERANCE};
pub use result::{CalibrationResult, ResultError};
pub use sample::{PoseSample, SampleSet};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
