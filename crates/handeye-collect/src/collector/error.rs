use crate::capture::CaptureError;
use crate::service::ServiceError;

/// Reasons a collection run ends without calling the solver.
#[derive(thiserror::Error, Debug)]
pub enum CollectError {
    #[error("motion service found no reachable pose (after {collected} samples)")]
    MotionInfeasible { collected: usize },
    #[error("motion service rejected the move request (after {collected} samples)")]
    MotionRejected {
        collected: usize,
        #[source]
        source: ServiceError,
    },
    #[error("motion service unreachable (after {collected} samples)")]
    MotionUnreachable {
        collected: usize,
        #[source]
        source: ServiceError,
    },
    #[error("collection cancelled (after {collected} samples)")]
    Cancelled { collected: usize },
    #[error("capture session failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("collector has already run")]
    AlreadyRan,
}

impl CollectError {
    /// Split a failed motion call into the unreachable and rejected cases.
    pub(crate) fn from_motion(collected: usize, source: ServiceError) -> Self {
        if source.is_unreachable() {
            Self::MotionUnreachable { collected, source }
        } else {
            Self::MotionRejected { collected, source }
        }
    }

    /// Samples held when the run was aborted, if the error happened mid-collection.
    pub fn collected(&self) -> Option<usize> {
        match self {
            Self::MotionInfeasible { collected }
            | Self::MotionRejected { collected, .. }
            | Self::MotionUnreachable { collected, .. }
            | Self::Cancelled { collected } => Some(*collected),
            Self::Capture(_) | Self::AlreadyRan => None,
        }
    }
}
