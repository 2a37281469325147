use serde::{Deserialize, Serialize};

use crate::Pose3D;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultError {
    #[error("successful calibration result without a transform")]
    MissingTransform,
    #[error("failed calibration result carries a transform")]
    UnexpectedTransform,
}

/// Outcome of the solver call that ends a collection run.
///
/// A failed result never carries a transform; there is no partial answer.
/// The JSON form `{ "success": bool, "transform"?: Pose3D }` is checked on
/// the way in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ResultRepr", into = "ResultRepr")]
pub struct CalibrationResult {
    transform: Option<Pose3D>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct ResultRepr {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transform: Option<Pose3D>,
}

impl TryFrom<ResultRepr> for CalibrationResult {
    type Error = ResultError;

    fn try_from(repr: ResultRepr) -> Result<Self, Self::Error> {
        match (repr.success, repr.transform) {
            (true, Some(transform)) => Ok(Self::solved(transform)),
            (false, None) => Ok(Self::failed()),
            (true, None) => Err(ResultError::MissingTransform),
            (false, Some(_)) => Err(ResultError::UnexpectedTransform),
        }
    }
}

impl From<CalibrationResult> for ResultRepr {
    fn from(result: CalibrationResult) -> Self {
        Self {
            success: result.is_success(),
            transform: result.transform,
        }
    }
}

impl CalibrationResult {
    pub fn solved(transform: Pose3D) -> Self {
        Self {
            transform: Some(transform),
        }
    }

    pub fn failed() -> Self {
        Self { transform: None }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.transform.is_some()
    }

    /// Solved transform, `None` when the solve failed.
    #[inline]
    pub fn transform(&self) -> Option<&Pose3D> {
        self.transform.as_ref()
    }
}

impl From<Option<Pose3D>> for CalibrationResult {
    fn from(transform: Option<Pose3D>) -> Self {
        Self { transform }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{UnitQuaternion, Vector3};

    #[test]
    fn success_follows_the_transform() {
        let pose = Pose3D::from_parts(Vector3::new(0.1, 0.0, 0.2), UnitQuaternion::identity());
        assert!(CalibrationResult::solved(pose).is_success());
        assert!(!CalibrationResult::failed().is_success());
        assert_eq!(CalibrationResult::from(None), CalibrationResult::failed());
    }

    #[test]
    fn json_keeps_success_flag() {
        let json = serde_json::to_value(CalibrationResult::failed()).unwrap();
        assert_eq!(json, serde_json::json!({ "success": false }));

        let pose = Pose3D::from_parts(Vector3::new(0.1, 0.0, 0.2), UnitQuaternion::identity());
        let solved = CalibrationResult::solved(pose);
        let json = serde_json::to_string(&solved).unwrap();
        let back: CalibrationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, solved);
    }

    #[test]
    fn inconsistent_json_is_rejected() {
        let err = serde_json::from_str::<CalibrationResult>(r#"{"success":true}"#).unwrap_err();
        assert!(err.to_string().contains("without a transform"));

        let raw = r#"{"success":false,"transform":{"translation":[0,0,0],"rotation":[0,0,0,1]}}"#;
        let err = serde_json::from_str::<CalibrationResult>(raw).unwrap_err();
        assert!(err.to_string().contains("carries a transform"));
    }
}
