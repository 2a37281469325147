use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use handeye_core::{CalibrationConfig, CalibrationResult, ConfigError, PoseSample, SampleSet};
use log::{error, info, warn};

use super::{CollectError, CollectionStats, CollectorState};
use crate::capture::{CaptureOutcome, CaptureSession, PatternCapture};
use crate::motion::MotionRequester;
use crate::solver::SolverClient;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Collects `target_sample_count` (robot pose, pattern pose) pairs and solves for the hand-eye transform.
///
/// Generic over the three capabilities it drives, so any of them can be a
/// real device, a simulation or a test double.
pub struct PosePairCollector<C, M, S> {
    config: CalibrationConfig,
    capture: C,
    motion: M,
    solver: S,
    state: CollectorState,
    samples: SampleSet,
    stats: CollectionStats,
    cancel: Option<Arc<AtomicBool>>,
}

impl<C, M, S> PosePairCollector<C, M, S>
where
    C: PatternCapture,
    M: MotionRequester,
    S: SolverClient,
{
    /// Create an idle collector. Fails if `config` is invalid.
    pub fn new(
        config: CalibrationConfig,
        capture: C,
        motion: M,
        solver: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let samples = SampleSet::with_capacity(config.target_sample_count);
        Ok(Self {
            config,
            capture,
            motion,
            solver,
            state: CollectorState::Idle,
            samples,
            stats: CollectionStats::default(),
            cancel: None,
        })
    }

    /// Abort between iterations once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[inline]
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// Samples collected so far. Empty again after a completed solve.
    #[inline]
    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    #[inline]
    pub fn stats(&self) -> &CollectionStats {
        &self.stats
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn motion(&self) -> &M {
        &self.motion
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn into_parts(self) -> (C, M, S) {
        (self.capture, self.motion, self.solver)
    }

    /// Run the whole collection and solve.
    ///
    /// `Ok` means the solver was called; check [`CalibrationResult::success`].
    /// `Err` means the run was aborted and the solver was never called. The
    /// capture session is shut down before this returns on every path.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(target = self.config.target_sample_count))
    )]
    pub fn run(&mut self) -> Result<CalibrationResult, CollectError> {
        if self.state != CollectorState::Idle {
            return Err(CollectError::AlreadyRan);
        }

        let Self {
            config,
            capture,
            motion,
            solver,
            state,
            samples,
            stats,
            cancel,
        } = self;

        let mut session = match CaptureSession::begin(capture, config.grid_spacing) {
            Ok(session) => session,
            Err(err) => {
                *state = CollectorState::Aborted;
                error!("could not start the calibration capture session: {err}");
                return Err(err.into());
            }
        };
        *state = CollectorState::Collecting;
        info!(
            "collecting {} pose pairs (grid spacing {}, min radius {})",
            config.target_sample_count, config.grid_spacing, config.min_radius
        );

        let collected = collect_samples(
            &mut session,
            motion,
            config,
            samples,
            stats,
            cancel.as_deref(),
        );
        session.finish();

        if let Err(err) = collected {
            *state = CollectorState::Aborted;
            error!("collection aborted: {err}");
            info!("{stats}");
            return Err(err);
        }

        *state = CollectorState::Solving;
        let result = solve(solver, config, samples);
        *state = CollectorState::Finished;
        info!("{stats}");
        if result.is_success() {
            info!("calibration succeeded");
        } else {
            error!("calibration failed");
        }
        Ok(result)
    }
}

/// The collecting state: iterate until the dataset is full or something aborts.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(target = config.target_sample_count))
)]
fn collect_samples<C, M>(
    session: &mut CaptureSession<'_, C>,
    motion: &mut M,
    config: &CalibrationConfig,
    samples: &mut SampleSet,
    stats: &mut CollectionStats,
    cancel: Option<&AtomicBool>,
) -> Result<(), CollectError>
where
    C: PatternCapture,
    M: MotionRequester + ?Sized,
{
    let target = config.target_sample_count;
    let settle = config.settle_delay();

    while samples.len() < target {
        if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            return Err(CollectError::Cancelled {
                collected: samples.len(),
            });
        }
        stats.iterations += 1;
        session.start_streaming()?;

        stats.motion_requests += 1;
        let response = motion
            .request_random_move(&config.estimated_pattern_pose, config.min_radius)
            .map_err(|source| CollectError::from_motion(samples.len(), source))?;
        if !response.success {
            return Err(CollectError::MotionInfeasible {
                collected: samples.len(),
            });
        }

        if !settle.is_zero() {
            thread::sleep(settle);
        }

        session.stop_streaming()?;
        session.clear_buffer()?;
        match session.capture(&config.capture) {
            CaptureOutcome::Captured { observations, pose } => {
                session.clear_buffer()?;
                samples.push(PoseSample::new(response.robot_pose, pose));
                stats.samples_collected = samples.len();
                info!(
                    "{} of {target} samples acquired ({observations} observations)",
                    samples.len()
                );
            }
            CaptureOutcome::Missed {
                observations,
                attempts,
            } => {
                stats.discarded_iterations += 1;
                warn!(
                    "pattern not captured at this pose ({observations} observations after {attempts} attempts), requesting a new one"
                );
            }
        }
    }
    Ok(())
}

/// The solving state: hand the dataset over, then discard it.
fn solve<S: SolverClient + ?Sized>(
    solver: &mut S,
    config: &CalibrationConfig,
    samples: &mut SampleSet,
) -> CalibrationResult {
    let delay = config.pre_solve_delay();
    if !delay.is_zero() {
        thread::sleep(delay);
    }
    info!("sending {} pose pairs to the solver", samples.len());
    let result = solver.solve(samples);
    samples.clear();
    result
}
