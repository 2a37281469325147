use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a [`PosePairCollector`](super::PosePairCollector).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorState {
    #[default]
    Idle,
    Collecting,
    Solving,
    /// The solver returned (successfully or not).
    Finished,
    /// Collection stopped early; the solver was never called.
    Aborted,
}

impl CollectorState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Aborted)
    }
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Solving => "solving",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Counters accumulated over one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Loop iterations started.
    pub iterations: usize,
    pub motion_requests: usize,
    /// Pose pairs appended to the dataset.
    pub samples_collected: usize,
    /// Iterations dropped because the pattern was not captured.
    pub discarded_iterations: usize,
}

impl fmt::Display for CollectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples from {} iterations ({} discarded, {} motion requests)",
            self.samples_collected, self.iterations, self.discarded_iterations, self.motion_requests
        )
    }
}
