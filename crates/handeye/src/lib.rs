//! High-level facade crate for the `handeye-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core types and the collection loop,
//! - JSON run configuration and report helpers ([`io`]),
//! - a simulated rig (robot, stereo head, solver) that drives the real
//!   collector end to end without hardware ([`sim`]),
//! - the `handeye` command-line tool (feature `cli`).
//!
//! ## Quickstart
//!
//! ```no_run
//! use handeye::io::RunConfig;
//! use handeye::sim::simulate;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cfg = RunConfig::default();
//! cfg.calibration = cfg.calibration.without_delays();
//! cfg.calibration.target_sample_count = 10;
//! cfg.sim.seed = Some(42);
//!
//! let report = simulate(&cfg, None, None)?;
//! println!("success: {}", report.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `handeye::core`: poses, pose pairs, configuration, result.
//! - `handeye::collect`: capture, motion and solver contracts and the collector.
//! - `handeye::io`: `RunConfig` / `RunReport`.
//! - `handeye::sim`: simulated rig.

pub use handeye_collect as collect;
pub use handeye_core as core;

pub use handeye_collect::{CollectError, CollectionStats, CollectorState, PosePairCollector};
pub use handeye_core::{CalibrationConfig, CalibrationResult, Pose3D, PoseSample, SampleSet};

pub mod io;
pub mod sim;
