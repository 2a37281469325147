//! Paired robot/pattern observations.

use serde::{Deserialize, Serialize};

use crate::Pose3D;

/// One observation epoch: where the robot was and where the pattern was seen.
///
/// Both poses come from the same collection iteration. Fields are private so a
/// sample cannot be edited once it has been recorded.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    robot_pose: Pose3D,
    pattern_pose: Pose3D,
}

impl PoseSample {
    pub fn new(robot_pose: Pose3D, pattern_pose: Pose3D) -> Self {
        Self {
            robot_pose,
            pattern_pose,
        }
    }

    /// Robot (base -> gripper) pose reported by the motion service.
    #[inline]
    pub fn robot_pose(&self) -> &Pose3D {
        &self.robot_pose
    }

    /// Pattern pose relative to the camera.
    #[inline]
    pub fn pattern_pose(&self) -> &Pose3D {
        &self.pattern_pose
    }
}

/// Ordered, append-only collection of [`PoseSample`]s.
///
/// Insertion order is collection order. The two pose sequences handed to the
/// solver are always derived from the same pairs, so they stay index-aligned.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleSet {
    samples: Vec<PoseSample>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: PoseSample) {
        self.samples.push(sample);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PoseSample> {
        self.samples.iter()
    }

    pub fn as_slice(&self) -> &[PoseSample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&PoseSample> {
        self.samples.last()
    }

    /// Robot poses in collection order.
    pub fn robot_poses(&self) -> Vec<Pose3D> {
        self.samples.iter().map(|s| s.robot_pose).collect()
    }

    /// Pattern poses in collection order, index-aligned with [`Self::robot_poses`].
    pub fn pattern_poses(&self) -> Vec<Pose3D> {
        self.samples.iter().map(|s| s.pattern_pose).collect()
    }

    /// Drop every sample (used once the dataset has been handed to the solver).
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl<'a> IntoIterator for &'a SampleSet {
    type Item = &'a PoseSample;
    type IntoIter = std::slice::Iter<'a, PoseSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

impl FromIterator<PoseSample> for SampleSet {
    fn from_iter<I: IntoIterator<Item = PoseSample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}
