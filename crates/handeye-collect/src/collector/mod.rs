//! Pose-pair collection loop.
//!
//! This module drives the robot through random poses, captures the pattern at
//! each one, pairs the achieved robot pose with the estimated pattern pose and
//! finally hands the dataset to the solver.

mod error;
mod pipeline;
mod state;

pub use error::CollectError;
pub use pipeline::PosePairCollector;
pub use state::{CollectionStats, CollectorState};
