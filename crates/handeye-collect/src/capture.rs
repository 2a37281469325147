//! Pattern capture contract, capture-session guard and retry policy.

use std::ops::{Deref, DerefMut};

use handeye_core::{CapturePolicy, Pose3D};
use log::{debug, warn};

use crate::grabber::GrabberError;

/// Errors reported by a [`PatternCapture`] implementation.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    /// A capture attempt could not run (sensor or stream unavailable).
    #[error("pattern capture failed: {reason}")]
    CaptureFailed { reason: String },
    #[error("no pattern observations buffered")]
    EmptyBuffer,
    #[error(transparent)]
    Device(#[from] GrabberError),
}

/// Camera-side operations the collection loop relies on.
///
/// Implementations own the observation buffer. The loop synchronizes with it
/// only through [`clear_buffer`](Self::clear_buffer): stop streaming, clear,
/// then capture, so observations never leak across iterations.
pub trait PatternCapture {
    /// Stop any active stream, clear the buffer, enter extrinsic-calibration
    /// mode with the given cell size and restart streaming.
    ///
    /// Must tolerate being called when no previous session exists.
    fn begin_calibration_session(&mut self, grid_spacing: f64) -> Result<(), CaptureError>;

    /// Start streaming if it is not already running.
    fn start_streaming(&mut self) -> Result<(), CaptureError>;

    /// Stop streaming if it is running.
    fn stop_streaming(&mut self) -> Result<(), CaptureError>;

    /// Discard buffered observations without touching the streaming state.
    fn clear_buffer(&mut self) -> Result<(), CaptureError>;

    /// One detection attempt; returns the cumulative buffered observation count.
    fn capture_attempt(&mut self) -> Result<usize, CaptureError>;

    /// Consume the buffered observations and return the pattern-to-camera pose.
    fn estimate_pattern_pose(&mut self) -> Result<Pose3D, CaptureError>;

    /// Release the camera session.
    fn shutdown(&mut self) -> Result<(), CaptureError>;
}

/// Result of one iteration's capture attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CaptureOutcome {
    /// Enough observations were buffered and a pattern pose was estimated.
    Captured { observations: usize, pose: Pose3D },
    /// The threshold was not reached (or estimation failed); nothing to record.
    Missed { observations: usize, attempts: usize },
}

/// Run up to `policy.max_attempts` captures, stopping as soon as
/// `policy.min_observations` are buffered, then estimate the pattern pose.
///
/// A failed attempt ends the attempts for this iteration. Misses are never
/// errors: the caller simply moves on to a new iteration.
pub fn capture_with_retries<C: PatternCapture + ?Sized>(
    capture: &mut C,
    policy: &CapturePolicy,
) -> CaptureOutcome {
    let mut observations = 0;
    let mut attempts = 0;
    while attempts < policy.max_attempts {
        attempts += 1;
        match capture.capture_attempt() {
            Ok(count) => {
                observations = count;
                debug!(
                    "capture attempt {attempts}/{}: {count} pattern observations",
                    policy.max_attempts
                );
                if count >= policy.min_observations {
                    break;
                }
            }
            Err(err) => {
                warn!("capture attempt {attempts} failed, giving up on this pose: {err}");
                break;
            }
        }
    }

    if observations < policy.min_observations {
        return CaptureOutcome::Missed {
            observations,
            attempts,
        };
    }

    match capture.estimate_pattern_pose() {
        Ok(pose) => CaptureOutcome::Captured { observations, pose },
        Err(err) => {
            warn!("pattern pose estimation failed: {err}");
            CaptureOutcome::Missed {
                observations,
                attempts,
            }
        }
    }
}

/// Scoped calibration session over a [`PatternCapture`].
///
/// Created with [`CaptureSession::begin`]; `shutdown` runs exactly once, either
/// through [`CaptureSession::finish`] or when the guard is dropped (early
/// returns, aborts and unwinding included).
pub struct CaptureSession<'a, C: PatternCapture> {
    capture: &'a mut C,
    active: bool,
}

impl<'a, C: PatternCapture> CaptureSession<'a, C> {
    /// Begin a calibration session. On failure the capture is shut down before returning.
    pub fn begin(capture: &'a mut C, grid_spacing: f64) -> Result<Self, CaptureError> {
        if let Err(err) = capture.begin_calibration_session(grid_spacing) {
            if let Err(shutdown_err) = capture.shutdown() {
                warn!("capture shutdown after failed session start: {shutdown_err}");
            }
            return Err(err);
        }
        Ok(Self {
            capture,
            active: true,
        })
    }

    /// Capture with retries according to `policy`.
    pub fn capture(&mut self, policy: &CapturePolicy) -> CaptureOutcome {
        capture_with_retries(&mut *self.capture, policy)
    }

    /// End the session now.
    pub fn finish(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Err(err) = self.capture.shutdown() {
            warn!("capture shutdown failed: {err}");
        }
    }
}

impl<C: PatternCapture> Deref for CaptureSession<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.capture
    }
}

impl<C: PatternCapture> DerefMut for CaptureSession<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.capture
    }
}

impl<C: PatternCapture> Drop for CaptureSession<'_, C> {
    fn drop(&mut self) {
        self.release();
    }
}
