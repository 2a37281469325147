//! Rigid 3D transforms.
//!
//! [`Pose3D`] is used for robot poses, pattern-to-camera poses and the final
//! hand-eye transform. The rotation part is always a valid rotation: every
//! fallible constructor checks orthonormality (or unit norm for quaternions)
//! before building the underlying [`Isometry3`].

use std::fmt;
use std::ops::Mul;

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Quaternion, Rotation3, Translation3, UnitQuaternion, Vector3,
};
use serde::{Deserialize, Serialize};

/// Tolerance used when validating rotation matrices and quaternions.
pub const ROTATION_TOLERANCE: f64 = 1e-6;

/// Errors produced when building a [`Pose3D`] from raw numbers.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("pose contains non-finite values")]
    NonFinite,
    #[error("rotation is not orthonormal (max |RᵀR - I| = {deviation:.3e})")]
    NotOrthonormal { deviation: f64 },
    #[error("rotation is a reflection (det = {det:.6})")]
    Reflection { det: f64 },
    #[error("last row of a rigid transform must be [0, 0, 0, 1]")]
    NotRigid,
    #[error("quaternion is not normalized (norm = {norm:.6})")]
    NotUnitQuaternion { norm: f64 },
}

/// Rigid transform: rotation followed by translation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PoseRepr", into = "PoseRepr")]
pub struct Pose3D {
    iso: Isometry3<f64>,
}

/// Wire layout: position + orientation quaternion in `[x, y, z, w]` order.
#[derive(Serialize, Deserialize)]
struct PoseRepr {
    translation: [f64; 3],
    rotation: [f64; 4],
}

impl TryFrom<PoseRepr> for Pose3D {
    type Error = PoseError;

    fn try_from(repr: PoseRepr) -> Result<Self, Self::Error> {
        Pose3D::from_translation_quaternion(repr.translation, repr.rotation)
    }
}

impl From<Pose3D> for PoseRepr {
    fn from(pose: Pose3D) -> Self {
        let t = pose.iso.translation.vector;
        let q = pose.iso.rotation;
        Self {
            translation: [t.x, t.y, t.z],
            rotation: [q.i, q.j, q.k, q.w],
        }
    }
}

impl Default for Pose3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose3D {
    pub fn identity() -> Self {
        Self {
            iso: Isometry3::identity(),
        }
    }

    /// Wrap an isometry. Its rotation is a unit quaternion, so no checks are needed.
    pub fn from_isometry(iso: Isometry3<f64>) -> Self {
        Self { iso }
    }

    pub fn from_parts(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            iso: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    /// Build from a translation and an `[x, y, z, w]` quaternion.
    pub fn from_translation_quaternion(
        translation: [f64; 3],
        rotation_xyzw: [f64; 4],
    ) -> Result<Self, PoseError> {
        if translation.iter().chain(rotation_xyzw.iter()).any(|v| !v.is_finite()) {
            return Err(PoseError::NonFinite);
        }
        let [x, y, z, w] = rotation_xyzw;
        let q = Quaternion::new(w, x, y, z);
        let norm = q.norm();
        if (norm - 1.0).abs() > ROTATION_TOLERANCE {
            return Err(PoseError::NotUnitQuaternion { norm });
        }
        // Unit up to rounding: keep the exact components so JSON round trips are lossless.
        let rotation = if (norm - 1.0).abs() <= 1e-12 {
            UnitQuaternion::new_unchecked(q)
        } else {
            UnitQuaternion::from_quaternion(q)
        };
        Ok(Self::from_parts(Vector3::from(translation), rotation))
    }

    /// Build from a 3x3 rotation matrix and a translation.
    pub fn from_rotation_translation(
        rotation: &Matrix3<f64>,
        translation: Vector3<f64>,
    ) -> Result<Self, PoseError> {
        if rotation.iter().chain(translation.iter()).any(|v| !v.is_finite()) {
            return Err(PoseError::NonFinite);
        }
        let deviation = (rotation.transpose() * rotation - Matrix3::identity())
            .abs()
            .max();
        if deviation > ROTATION_TOLERANCE {
            return Err(PoseError::NotOrthonormal { deviation });
        }
        let det = rotation.determinant();
        if det <= 0.0 {
            return Err(PoseError::Reflection { det });
        }
        let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*rotation));
        Ok(Self::from_parts(translation, rot))
    }

    /// Build from a homogeneous 4x4 transform.
    pub fn from_matrix(m: &Matrix4<f64>) -> Result<Self, PoseError> {
        if m.iter().any(|v| !v.is_finite()) {
            return Err(PoseError::NonFinite);
        }
        let last = m.fixed_view::<1, 4>(3, 0);
        let expected = [0.0, 0.0, 0.0, 1.0];
        if last
            .iter()
            .zip(expected)
            .any(|(v, e)| (v - e).abs() > ROTATION_TOLERANCE)
        {
            return Err(PoseError::NotRigid);
        }
        let rotation: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let translation: Vector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();
        Self::from_rotation_translation(&rotation, translation)
    }

    #[inline]
    pub fn isometry(&self) -> &Isometry3<f64> {
        &self.iso
    }

    #[inline]
    pub fn translation(&self) -> Vector3<f64> {
        self.iso.translation.vector
    }

    #[inline]
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.iso.rotation
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        *self.iso.rotation.to_rotation_matrix().matrix()
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        self.iso.to_homogeneous()
    }

    pub fn inverse(&self) -> Self {
        Self {
            iso: self.iso.inverse(),
        }
    }

    /// `self * other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Pose3D) -> Self {
        Self {
            iso: self.iso * other.iso,
        }
    }

    /// Euclidean distance between the two translations.
    pub fn translation_distance(&self, other: &Pose3D) -> f64 {
        (self.translation() - other.translation()).norm()
    }

    /// Angle (radians) of the relative rotation between the two poses.
    pub fn rotation_angle_to(&self, other: &Pose3D) -> f64 {
        self.iso.rotation.angle_to(&other.iso.rotation)
    }
}

impl Mul for Pose3D {
    type Output = Pose3D;

    fn mul(self, rhs: Pose3D) -> Pose3D {
        self.compose(&rhs)
    }
}

impl From<Isometry3<f64>> for Pose3D {
    fn from(iso: Isometry3<f64>) -> Self {
        Self::from_isometry(iso)
    }
}

impl fmt::Display for Pose3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.translation();
        let (roll, pitch, yaw) = self.iso.rotation.euler_angles();
        write!(
            f,
            "t=[{:.4}, {:.4}, {:.4}] rpy=[{:.2}°, {:.2}°, {:.2}°]",
            t.x,
            t.y,
            t.z,
            roll.to_degrees(),
            pitch.to_degrees(),
            yaw.to_degrees()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pattern_prior_matrix() -> Matrix4<f64> {
        Matrix4::new(
            0.0, 0.0, 1.0, -1.0, //
            0.0, 1.0, 0.0, 0.0, //
            -1.0, 0.0, 0.0, 0.8, //
            0.0, 0.0, 0.0, 1.0,
        )
    }

    #[test]
    fn homogeneous_matrix_is_preserved() {
        let m = pattern_prior_matrix();
        let pose = Pose3D::from_matrix(&m).expect("valid rigid transform");
        assert_relative_eq!(pose.to_matrix(), m, epsilon = 1e-12);
        assert_relative_eq!(pose.translation(), Vector3::new(-1.0, 0.0, 0.8));
    }

    #[test]
    fn rejects_scaled_rotation() {
        let mut m = pattern_prior_matrix();
        m[(0, 2)] = 1.1;
        assert!(matches!(
            Pose3D::from_matrix(&m),
            Err(PoseError::NotOrthonormal { .. })
        ));
    }

    #[test]
    fn rejects_reflection() {
        let r = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, -1.0);
        assert!(matches!(
            Pose3D::from_rotation_translation(&r, Vector3::zeros()),
            Err(PoseError::Reflection { .. })
        ));
    }

    #[test]
    fn rejects_projective_last_row() {
        let mut m = pattern_prior_matrix();
        m[(3, 0)] = 0.2;
        assert_eq!(Pose3D::from_matrix(&m), Err(PoseError::NotRigid));
    }

    #[test]
    fn rejects_non_unit_quaternion_and_nan() {
        assert!(matches!(
            Pose3D::from_translation_quaternion([0.0; 3], [0.0, 0.0, 0.0, 2.0]),
            Err(PoseError::NotUnitQuaternion { .. })
        ));
        assert_eq!(
            Pose3D::from_translation_quaternion([f64::NAN, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]),
            Err(PoseError::NonFinite)
        );
    }

    #[test]
    fn inverse_composes_to_identity() {
        let pose = Pose3D::from_matrix(&pattern_prior_matrix()).unwrap();
        let id = pose * pose.inverse();
        assert_relative_eq!(id.to_matrix(), Matrix4::identity(), epsilon = 1e-12);
        assert_relative_eq!(pose.translation_distance(&Pose3D::identity()), 1.64_f64.sqrt());
        assert_relative_eq!(
            pose.rotation_angle_to(&Pose3D::identity()),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn json_uses_translation_and_xyzw_quaternion() {
        let pose = Pose3D::from_parts(
            Vector3::new(0.1, -0.2, 0.3),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
        );
        let json = serde_json::to_value(pose).unwrap();
        let q = json["rotation"].as_array().unwrap();
        assert_eq!(q.len(), 4);
        assert_relative_eq!(q[2].as_f64().unwrap(), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
        assert_relative_eq!(q[3].as_f64().unwrap(), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);

        let back: Pose3D = serde_json::from_value(json).unwrap();
        assert_relative_eq!(back.to_matrix(), pose.to_matrix(), epsilon = 1e-12);

        let bad = serde_json::json!({ "translation": [0.0, 0.0, 0.0], "rotation": [0.0, 0.0, 0.0, 3.0] });
        assert!(serde_json::from_value::<Pose3D>(bad).is_err());
    }

    #[test]
    fn json_text_round_trip_is_exact() {
        let a = Pose3D::from_parts(
            Vector3::new(-0.2075474134705163, 0.1 + 0.2, 1.0 / 3.0),
            UnitQuaternion::from_euler_angles(0.3, -0.7, 1.1),
        );
        let b = Pose3D::from_parts(
            Vector3::new(0.05, -0.11, 0.42),
            UnitQuaternion::from_euler_angles(-1.2, 0.4, 2.9),
        );
        for pose in [a, b, a * b, (a * b).inverse()] {
            let text = serde_json::to_string(&pose).unwrap();
            let back: Pose3D = serde_json::from_str(&text).unwrap();
            assert_eq!(back, pose, "{text}");
        }
    }
}
